use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::testgen::candidate::{CandidatePair, CandidateSlot};
use crate::testgen::fixture::TestFixture;

pub type ProblemId = i64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("store document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no problem with id {0}")]
    UnknownProblem(ProblemId),

    #[error("no test fixture for problem {0}")]
    UnknownFixture(ProblemId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: ProblemId,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version1: Option<String>,
    #[serde(default)]
    pub version2: Option<String>,
    #[serde(default)]
    pub preference: Option<CandidateSlot>,
    #[serde(default)]
    pub labeled_at: Option<DateTime<Utc>>,
}

impl Problem {
    /// Stored pair, when both versions are present and non-empty.
    pub fn candidates(&self) -> Option<CandidatePair> {
        match (&self.version1, &self.version2) {
            (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
                Some(CandidatePair::new(a.clone(), b.clone()))
            }
            _ => None,
        }
    }
}

/* ---------- collaborator contracts ---------- */

pub trait ProblemStore {
    fn problems(&self) -> Vec<Problem>;

    /// Index of the first problem that has no generated pair yet.
    fn first_unlabeled_index(&self) -> usize {
        self.problems()
            .iter()
            .position(|p| p.version1.is_none())
            .unwrap_or(0)
    }
}

pub trait FixtureStore {
    /// `Ok(None)` when the problem has no tests; that is not an error.
    fn load_fixture(&self, id: ProblemId) -> Result<Option<TestFixture>, StoreError>;

    fn update_function_name(&mut self, id: ProblemId, name: &str) -> Result<String, StoreError>;
}

/// Write side for labeling results. `Ok` carries a message for the human.
pub trait PreferenceStore {
    fn record_code_and_preference(
        &mut self,
        id: ProblemId,
        pair: &CandidatePair,
        preference: CandidateSlot,
    ) -> Result<String, StoreError>;

    fn record_preference_only(
        &mut self,
        id: ProblemId,
        preference: CandidateSlot,
    ) -> Result<String, StoreError>;

    fn save_comparison(&mut self, id: ProblemId, pair: &CandidatePair)
        -> Result<String, StoreError>;
}

/* ---------- operation status relayed to the labeler ---------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReport {
    pub status: OperationStatus,
    pub message: String,
}

impl OperationReport {
    pub fn from_result(result: Result<String, StoreError>) -> Self {
        match result {
            Ok(message) => Self {
                status: OperationStatus::Success,
                message,
            },
            Err(e) => {
                warn!(error = %e, "store operation failed");
                Self {
                    status: OperationStatus::Error,
                    message: e.to_string(),
                }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }
}

/* ---------- JSON document store ---------- */

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub problems: Vec<Problem>,
    #[serde(default)]
    pub tests: Vec<TestFixture>,
}

/// All tables in one JSON file, rewritten after every update.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    doc: StoreDocument,
}

impl JsonStore {
    /// Opens `path`; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let doc = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => StoreDocument::default(),
            Err(e) => return Err(e.into()),
        };

        info!(
            path = %path.display(),
            problems = doc.problems.len(),
            fixtures = doc.tests.len(),
            "opened store"
        );
        Ok(Self { path, doc })
    }

    pub fn with_document(path: impl Into<PathBuf>, doc: StoreDocument) -> Self {
        Self {
            path: path.into(),
            doc,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &StoreDocument {
        &self.doc
    }

    pub fn problem(&self, id: ProblemId) -> Option<&Problem> {
        self.doc.problems.iter().find(|p| p.id == id)
    }

    /// Writes the current document to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        write_document(&self.path, &self.doc)
    }

    /// Applies `f` to a copy and only commits it once it is on disk.
    fn update<F>(&mut self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreDocument) -> Result<(), StoreError>,
    {
        let mut next = self.doc.clone();
        f(&mut next)?;
        write_document(&self.path, &next)?;
        self.doc = next;
        Ok(())
    }

    fn update_problem<F>(&mut self, id: ProblemId, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Problem),
    {
        self.update(|doc| {
            let problem = doc
                .problems
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(StoreError::UnknownProblem(id))?;
            f(problem);
            Ok(())
        })
    }
}

impl ProblemStore for JsonStore {
    fn problems(&self) -> Vec<Problem> {
        self.doc.problems.clone()
    }
}

impl FixtureStore for JsonStore {
    fn load_fixture(&self, id: ProblemId) -> Result<Option<TestFixture>, StoreError> {
        Ok(self
            .doc
            .tests
            .iter()
            .find(|t| t.id == id && !t.inputs.is_empty())
            .cloned())
    }

    fn update_function_name(&mut self, id: ProblemId, name: &str) -> Result<String, StoreError> {
        self.update(|doc| {
            let fixture = doc
                .tests
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or(StoreError::UnknownFixture(id))?;
            fixture.function_name = name.to_string();
            Ok(())
        })?;
        info!(id, function = name, "updated fixture function name");
        Ok("Test fixture has been updated successfully!".to_string())
    }
}

impl PreferenceStore for JsonStore {
    fn record_code_and_preference(
        &mut self,
        id: ProblemId,
        pair: &CandidatePair,
        preference: CandidateSlot,
    ) -> Result<String, StoreError> {
        self.update_problem(id, |p| {
            p.version1 = Some(pair.version1.clone());
            p.version2 = Some(pair.version2.clone());
            p.preference = Some(preference);
            p.labeled_at = Some(Utc::now());
        })?;
        info!(id, preference = %preference, "recorded code pair and preference");
        Ok("Code and preference have been recorded successfully!".to_string())
    }

    fn record_preference_only(
        &mut self,
        id: ProblemId,
        preference: CandidateSlot,
    ) -> Result<String, StoreError> {
        self.update_problem(id, |p| {
            p.preference = Some(preference);
            p.labeled_at = Some(Utc::now());
        })?;
        info!(id, preference = %preference, "recorded preference");
        Ok("Preference has been recorded successfully!".to_string())
    }

    fn save_comparison(
        &mut self,
        id: ProblemId,
        pair: &CandidatePair,
    ) -> Result<String, StoreError> {
        self.update_problem(id, |p| {
            p.version1 = Some(pair.version1.clone());
            p.version2 = Some(pair.version2.clone());
        })?;
        info!(id, "saved code pair");
        Ok("Comparison has been saved successfully!".to_string())
    }
}

fn write_document(path: &Path, doc: &StoreDocument) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let text = serde_json::to_string_pretty(doc)?;
    fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem(id: ProblemId, version1: Option<&str>) -> Problem {
        Problem {
            id,
            difficulty: "Easy".into(),
            title: format!("Problem {id}"),
            description: "Add two numbers.".into(),
            version1: version1.map(str::to_string),
            version2: version1.map(|_| "def add(a,b): return b+a".to_string()),
            preference: None,
            labeled_at: None,
        }
    }

    fn seeded(dir: &Path) -> JsonStore {
        let doc = StoreDocument {
            problems: vec![
                problem(1, Some("def add(a,b): return a+b")),
                problem(2, None),
                problem(3, None),
            ],
            tests: vec![
                TestFixture::new(1, "add", vec!["(1,2)".into()], vec!["[3]".into()]),
                TestFixture::new(2, "add", Vec::new(), Vec::new()),
            ],
        };
        let store = JsonStore::with_document(dir.join("store.json"), doc);
        store.flush().unwrap();
        store
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("none.json")).unwrap();
        assert!(store.problems().is_empty());
        assert_eq!(store.first_unlabeled_index(), 0);
    }

    #[test]
    fn fixture_without_inputs_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded(dir.path());

        assert!(store.load_fixture(1).unwrap().is_some());
        assert!(store.load_fixture(2).unwrap().is_none());
        assert!(store.load_fixture(99).unwrap().is_none());
    }

    #[test]
    fn first_unlabeled_skips_generated_problems() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded(dir.path());
        assert_eq!(store.first_unlabeled_index(), 1);
    }

    #[test]
    fn writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = seeded(dir.path());
        let pair = CandidatePair::new("def add(a,b): return a+b", "def add(a,b): return sum((a,b))");

        let msg = store
            .record_code_and_preference(2, &pair, CandidateSlot::Version2)
            .unwrap();
        assert!(msg.contains("successfully"));
        store.update_function_name(1, "plus").unwrap();

        let reopened = JsonStore::open(store.path()).unwrap();
        let p = reopened.problem(2).unwrap();
        assert_eq!(p.candidates(), Some(pair));
        assert_eq!(p.preference, Some(CandidateSlot::Version2));
        assert!(p.labeled_at.is_some());
        assert_eq!(reopened.load_fixture(1).unwrap().unwrap().function_name, "plus");

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"preference\": 1"));
    }

    #[test]
    fn preference_only_keeps_code() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = seeded(dir.path());

        store.record_preference_only(1, CandidateSlot::Version1).unwrap();
        let p = store.problem(1).unwrap();
        assert_eq!(p.preference, Some(CandidateSlot::Version1));
        assert_eq!(p.version1.as_deref(), Some("def add(a,b): return a+b"));
    }

    #[test]
    fn unknown_ids_are_errors_and_leave_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = seeded(dir.path());
        let before = store.document().clone();

        let err = store.record_preference_only(42, CandidateSlot::Version1).unwrap_err();
        assert!(matches!(err, StoreError::UnknownProblem(42)));
        let err = store.update_function_name(3, "f").unwrap_err();
        assert!(matches!(err, StoreError::UnknownFixture(3)));
        assert_eq!(store.document(), &before);
    }

    #[test]
    fn report_relays_status_and_message() {
        let ok = OperationReport::from_result(Ok("done".into()));
        assert!(ok.is_success());
        assert_eq!(ok.message, "done");

        let err = OperationReport::from_result(Err(StoreError::UnknownProblem(5)));
        assert_eq!(err.status, OperationStatus::Error);
        assert_eq!(err.message, "no problem with id 5");
    }
}
