use std::process::Command;

use codepair::llm::{GenerationError, GenerationSource};
use codepair::state::SessionState;
use codepair::store::{
    FixtureStore, JsonStore, OperationStatus, Problem, ProblemStore, StoreDocument,
};
use codepair::testgen::{CandidateSlot, HarnessRunner, Outcome, TestFixture};

struct Canned(String);

impl GenerationSource for Canned {
    fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Ok(self.0.clone())
    }
}

fn payload(version1: &str, version2: &str) -> String {
    let lines = [
        "Solution one:\n```python\n".to_string(),
        version1.to_string(),
        "```\nSolution two:\n```python\n".to_string(),
        version2.to_string(),
        "```".to_string(),
    ];
    let mut out: Vec<String> = lines
        .iter()
        .map(|t| serde_json::json!({ "response": t, "done": false }).to_string())
        .collect();
    out.push(r#"{"response":"","done":true}"#.to_string());
    out.join("\n")
}

fn problem(id: i64) -> Problem {
    Problem {
        id,
        difficulty: "Easy".into(),
        title: format!("Problem {id}"),
        description: "Return the sum of two integers.".into(),
        version1: None,
        version2: None,
        preference: None,
        labeled_at: None,
    }
}

fn seeded_store(dir: &std::path::Path) -> JsonStore {
    let doc = StoreDocument {
        problems: vec![problem(1), problem(2)],
        tests: vec![TestFixture::new(
            1,
            "sumOfTwo",
            vec!["(1,2)".into(), "(10,-3)".into()],
            vec!["[3]".into(), "[7]".into()],
        )],
    };
    let store = JsonStore::with_document(dir.join("store.json"), doc);
    store.flush().unwrap();
    store
}

fn python() -> Option<&'static str> {
    ["python3", "python"].into_iter().find(|p| {
        Command::new(p)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    })
}

#[test]
fn generate_save_and_prefer_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = seeded_store(dir.path());
    let mut state = SessionState::new(store.problems(), store.first_unlabeled_index());
    assert_eq!(state.current_id(), Some(1));

    let source = Canned(payload(
        "def add(a, b):\n    return a + b\n",
        "def add(a, b):\n    return sum((a, b))\n",
    ));
    let pair = state.generate(&source, "").unwrap();
    assert_eq!(pair.version2, "def add(a, b):\n    return sum((a, b))\n");

    let fixture = store.load_fixture(1).unwrap().unwrap();
    let retargeted = state.retarget_fixture(&fixture);
    assert_eq!(retargeted.function_name, "add");
    store.update_function_name(1, &retargeted.function_name).unwrap();

    assert!(state.save_pair(&mut store).is_success());
    let report = state.submit_preference(&mut store, CandidateSlot::Version2);
    assert_eq!(report.status, OperationStatus::Success);
    assert_eq!(state.current_id(), Some(2));

    let reopened = JsonStore::open(dir.path().join("store.json")).unwrap();
    let saved = reopened.problem(1).unwrap();
    assert_eq!(saved.candidates(), Some(pair));
    assert_eq!(saved.preference, Some(CandidateSlot::Version2));
    assert_eq!(reopened.load_fixture(1).unwrap().unwrap().function_name, "add");
    assert_eq!(reopened.first_unlabeled_index(), 1);
}

#[test]
fn generated_pair_is_tested_independently() {
    let Some(py) = python() else {
        eprintln!("skipping: no python interpreter on PATH");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path());
    let mut state = SessionState::new(store.problems(), 0);
    let runner = HarnessRunner::new(dir.path().join("runs")).with_python(py);

    state
        .generate(
            &Canned(payload(
                "def add(a, b):\n    return a + b\n",
                "def add(a, b):\n    return undefined_name\n",
            )),
            "",
        )
        .unwrap();
    let fixture = state.retarget_fixture(&store.load_fixture(1).unwrap().unwrap());

    let results = state.run_tests(&runner, &fixture).unwrap();
    let first = results.version1.as_ref().unwrap();
    let second = results.version2.as_ref().unwrap();

    assert_eq!(first.outcomes, vec![Outcome::Passed, Outcome::Passed]);
    assert_eq!(second.outcomes, vec![Outcome::Error, Outcome::Error]);
    assert!(state.cached_results().is_some());
}

#[test]
fn problem_without_fixture_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path());
    assert!(store.load_fixture(2).unwrap().is_none());
}
