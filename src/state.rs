use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use thiserror::Error;

use crate::llm::client::{GenerationError, GenerationSource};
use crate::llm::prompt::build_prompt;
use crate::llm::stream::{extract, ExtractError};
use crate::logger::log;
use crate::store::{OperationReport, OperationStatus, PreferenceStore, Problem, ProblemId};
use crate::testgen::candidate::{extract_function_name, CandidatePair, CandidateSlot};
use crate::testgen::fixture::TestFixture;
use crate::testgen::runner::{HarnessRunner, TestReport};

pub const MAX_LOGS: usize = 1000;

/* ---------- logging ---------- */

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
}

#[derive(Clone, Debug)]
pub struct LogLine {
    pub level: LogLevel,
    pub text: String,
    pub at: Instant,
}

/* ---------- labeling round ---------- */

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("no problem is selected")]
    NoProblem,

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Test results for both candidates of one pair.
///
/// Each side is independent: a host failure on one side is kept as a
/// message and does not stop the other.
#[derive(Debug, Clone)]
pub struct PairResults {
    pub fingerprint: String,
    pub version1: Result<TestReport, String>,
    pub version2: Result<TestReport, String>,
}

impl PairResults {
    pub fn get(&self, slot: CandidateSlot) -> &Result<TestReport, String> {
        match slot {
            CandidateSlot::Version1 => &self.version1,
            CandidateSlot::Version2 => &self.version2,
        }
    }
}

/// Everything the UI shell needs between interactions.
pub struct SessionState {
    /* local copy of the problem table */
    pub problems: Vec<Problem>,
    pub index: usize,

    /* current round */
    pub candidates: Option<CandidatePair>,
    pub results: HashMap<ProblemId, PairResults>,
    pub report: Option<OperationReport>,

    pub logs: VecDeque<LogLine>,
}

impl SessionState {
    pub fn new(problems: Vec<Problem>, start: usize) -> Self {
        let mut state = Self {
            problems,
            index: 0,
            candidates: None,
            results: HashMap::new(),
            report: None,
            logs: VecDeque::new(),
        };
        state.select(start);
        state
    }

    pub fn current(&self) -> Option<&Problem> {
        self.problems.get(self.index)
    }

    pub fn current_id(&self) -> Option<ProblemId> {
        self.current().map(|p| p.id)
    }

    /// Moves to the problem with `id`; returns whether it exists.
    pub fn select_id(&mut self, id: ProblemId) -> bool {
        match self.problems.iter().position(|p| p.id == id) {
            Some(index) => {
                self.select(index);
                true
            }
            None => false,
        }
    }

    /// Moves `delta` problems forward or back, clamped to the table.
    pub fn change_question(&mut self, delta: isize) {
        let target = self.index.saturating_add_signed(delta);
        self.select(target);
    }

    fn select(&mut self, index: usize) {
        self.index = index.min(self.problems.len().saturating_sub(1));
        self.report = None;
        self.candidates = self.current().and_then(Problem::candidates);
    }

    /// Requests a fresh pair for the current problem.
    ///
    /// Candidates are cleared first and stay cleared if the payload cannot
    /// be parsed.
    pub fn generate(
        &mut self,
        source: &dyn GenerationSource,
        instruction: &str,
    ) -> Result<CandidatePair, LabelError> {
        self.candidates = None;
        let problem = self.current().ok_or(LabelError::NoProblem)?;
        let id = problem.id;
        let prompt = build_prompt(instruction, &problem.description);

        log(self, LogLevel::Info, format!("generating code pair for problem {id}"));

        let raw = source.generate(&prompt).map_err(|e| {
            log(self, LogLevel::Error, e.to_string());
            e
        })?;
        let pair = extract(&raw).map_err(|e| {
            log(self, LogLevel::Warn, e.to_string());
            e
        })?;

        if let Some(problem) = self.problems.get_mut(self.index) {
            problem.version1 = Some(pair.version1.clone());
            problem.version2 = Some(pair.version2.clone());
        }
        self.candidates = Some(pair.clone());
        log(self, LogLevel::Success, format!("code pair ready for problem {id}"));

        Ok(pair)
    }

    /// Fixture retargeted at the first candidate's function, if it defines one.
    pub fn retarget_fixture(&self, fixture: &TestFixture) -> TestFixture {
        let mut fixture = fixture.clone();
        if let Some(name) = self
            .candidates
            .as_ref()
            .and_then(|pair| extract_function_name(&pair.version1))
        {
            fixture.function_name = name;
        }
        fixture
    }

    /// Runs both candidates against `fixture` and caches the results.
    pub fn run_tests(
        &mut self,
        runner: &HarnessRunner,
        fixture: &TestFixture,
    ) -> Option<&PairResults> {
        let id = self.current_id()?;
        let pair = self.candidates.clone()?;

        let run = |slot: CandidateSlot| {
            runner
                .run(slot, pair.get(slot), fixture)
                .map_err(|e| e.to_string())
        };
        let results = PairResults {
            fingerprint: pair.fingerprint(),
            version1: run(CandidateSlot::Version1),
            version2: run(CandidateSlot::Version2),
        };

        for slot in CandidateSlot::ALL {
            match results.get(slot) {
                Ok(report) => log(
                    self,
                    LogLevel::Info,
                    format!("{slot}: {}/{} passed", report.passed(), report.outcomes.len()),
                ),
                Err(e) => log(self, LogLevel::Error, format!("{slot}: {e}")),
            }
        }

        self.results.insert(id, results);
        self.results.get(&id)
    }

    /// Cached results, only if they belong to the pair currently shown.
    pub fn cached_results(&self) -> Option<&PairResults> {
        let pair = self.candidates.as_ref()?;
        let results = self.results.get(&self.current_id()?)?;
        (results.fingerprint == pair.fingerprint()).then_some(results)
    }

    /// Records `preference` alone and advances to the next problem.
    pub fn submit_preference<S: PreferenceStore>(
        &mut self,
        store: &mut S,
        preference: CandidateSlot,
    ) -> OperationReport {
        let Some(id) = self.current_id() else {
            return self.no_problem_report();
        };

        let report = OperationReport::from_result(store.record_preference_only(id, preference));
        self.finish(report.clone());

        if report.is_success() {
            self.mark_preference(preference);
            self.change_question(1);
            self.report = Some(report.clone());
        }
        report
    }

    pub fn submit_code_and_preference<S: PreferenceStore>(
        &mut self,
        store: &mut S,
        preference: CandidateSlot,
    ) -> OperationReport {
        let (Some(id), Some(pair)) = (self.current_id(), self.candidates.clone()) else {
            return self.no_problem_report();
        };

        let report = OperationReport::from_result(
            store.record_code_and_preference(id, &pair, preference),
        );
        self.finish(report.clone());
        if report.is_success() {
            self.mark_preference(preference);
        }
        report
    }

    pub fn save_pair<S: PreferenceStore>(&mut self, store: &mut S) -> OperationReport {
        let (Some(id), Some(pair)) = (self.current_id(), self.candidates.clone()) else {
            return self.no_problem_report();
        };

        let report = OperationReport::from_result(store.save_comparison(id, &pair));
        self.finish(report.clone());
        report
    }

    /// Local copy only; callers update it after the store accepted the write.
    fn mark_preference(&mut self, preference: CandidateSlot) {
        if let Some(problem) = self.problems.get_mut(self.index) {
            problem.preference = Some(preference);
        }
    }

    fn finish(&mut self, report: OperationReport) {
        let level = if report.is_success() {
            LogLevel::Success
        } else {
            LogLevel::Error
        };
        log(self, level, report.message.clone());
        self.report = Some(report);
    }

    fn no_problem_report(&mut self) -> OperationReport {
        let report = OperationReport {
            status: OperationStatus::Error,
            message: "no code pair to record".to_string(),
        };
        self.finish(report.clone());
        report
    }
}
