// Executes a materialized harness in a child interpreter and reduces the
// runner's progress line to one outcome per fixture row.

use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::testgen::candidate::CandidateSlot;
use crate::testgen::fixture::TestFixture;
use crate::testgen::materialize::{materialize_harness, HarnessFiles};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Verdict for one fixture row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Passed,
    Failed,
    Error,
    /// The run was killed before this row reported.
    Timeout,
}

impl Outcome {
    /// Maps one character of the unittest progress line.
    pub fn from_progress(c: char) -> Self {
        match c {
            '.' => Outcome::Passed,
            'F' => Outcome::Failed,
            _ => Outcome::Error,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Passed => "Passed",
            Outcome::Failed => "Failed",
            Outcome::Error => "Error",
            Outcome::Timeout => "Timeout",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Outcome::Passed => "✅",
            Outcome::Failed => "❌",
            Outcome::Error => "❗",
            Outcome::Timeout => "⏱",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Host-side failures. A crashing candidate is never one of these.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("harness I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub slot: CandidateSlot,
    pub outcomes: Vec<Outcome>,
    /// Line the outcomes were read from, kept for diagnostics.
    pub progress_line: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl TestReport {
    fn empty(slot: CandidateSlot) -> Self {
        Self {
            slot,
            outcomes: Vec::new(),
            progress_line: String::new(),
            duration_ms: 0,
            timed_out: false,
        }
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.iter().filter(|o| **o == outcome).count()
    }

    pub fn passed(&self) -> usize {
        self.count(Outcome::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::Failed)
    }

    pub fn errored(&self) -> usize {
        self.count(Outcome::Error)
    }

    pub fn all_passed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| *o == Outcome::Passed)
    }
}

/// Raw result of one child process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

#[derive(Debug, Clone)]
pub struct HarnessRunner {
    python: String,
    workdir: PathBuf,
    timeout: Option<Duration>,
}

impl HarnessRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            python: "python3".to_string(),
            workdir: workdir.into(),
            timeout: None,
        }
    }

    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    /// Kill runs that exceed `timeout`. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs `code` against every row of `fixture`.
    ///
    /// The returned outcomes are positionally aligned with the fixture rows
    /// and never longer than the fixture.
    pub fn run(
        &self,
        slot: CandidateSlot,
        code: &str,
        fixture: &TestFixture,
    ) -> Result<TestReport, HarnessError> {
        let rows = fixture.len();
        if rows == 0 {
            return Ok(TestReport::empty(slot));
        }

        let files = materialize_harness(&self.workdir, slot, code, fixture)?;

        let started = Instant::now();
        let output = self.execute(&files)?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let progress_line = progress_line(&output.stdout, &output.stderr).to_string();
        let mut outcomes = reduce_output(&output.stdout, &output.stderr);
        outcomes.truncate(rows);
        if output.timed_out {
            outcomes.resize(rows, Outcome::Timeout);
        }

        info!(
            slot = %slot,
            rows,
            duration_ms,
            timed_out = output.timed_out,
            progress = %progress_line,
            "harness finished"
        );

        Ok(TestReport {
            slot,
            outcomes,
            progress_line,
            duration_ms,
            timed_out: output.timed_out,
        })
    }

    /// Same as [`run`](Self::run) over bare fixture columns.
    pub fn run_cases(
        &self,
        slot: CandidateSlot,
        code: &str,
        function_name: &str,
        inputs: &[String],
        outputs: &[String],
    ) -> Result<Vec<Outcome>, HarnessError> {
        let fixture = TestFixture::new(0, function_name, inputs.to_vec(), outputs.to_vec());
        self.run(slot, code, &fixture).map(|report| report.outcomes)
    }

    fn execute(&self, files: &HarnessFiles) -> Result<ProcessOutput, HarnessError> {
        // Invoked by file name from inside the workdir so the interpreter puts
        // the workdir first on sys.path and the solution import resolves.
        let script = files.test.file_name().unwrap_or(files.test.as_os_str());
        let mut child = Command::new(&self.python)
            .arg("-B")
            .arg(script)
            .current_dir(&self.workdir)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                program: self.python.clone(),
                source,
            })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let waited = match self.timeout {
            Some(limit) => wait_with_deadline(&mut child, limit),
            None => child.wait().map(|_| false),
        };

        let timed_out = match waited {
            Ok(timed_out) => timed_out,
            Err(err) => {
                warn!(pid = child.id(), error = %err, "lost track of harness; killing");
                abandon(&mut child, stdout, stderr);
                return Err(err.into());
            }
        };

        Ok(ProcessOutput {
            stdout: collect(stdout),
            stderr: collect(stderr),
            timed_out,
        })
    }
}

/// First line of stdout when stdout is non-empty, otherwise of stderr.
pub fn progress_line<'a>(stdout: &'a str, stderr: &'a str) -> &'a str {
    let source = if stdout.is_empty() { stderr } else { stdout };
    source.lines().next().unwrap_or("")
}

/// `.` → Passed, `F` → Failed, anything else → Error.
pub fn reduce_output(stdout: &str, stderr: &str) -> Vec<Outcome> {
    progress_line(stdout, stderr)
        .chars()
        .map(Outcome::from_progress)
        .collect()
}

/// Markdown list of the first `limit` outcomes under a header.
pub fn render_results(outcomes: &[Outcome], limit: usize, header: &str) -> String {
    let mut out = format!("`{header}:`\n");
    for (i, outcome) in outcomes.iter().take(limit).enumerate() {
        out.push_str(&format!("* test{}: {}\n", i + 1, outcome.label()));
    }
    out
}

fn wait_with_deadline(child: &mut Child, limit: Duration) -> io::Result<bool> {
    let started = Instant::now();
    loop {
        if child.try_wait()?.is_some() {
            return Ok(false);
        }

        let elapsed = started.elapsed();
        if elapsed >= limit {
            warn!(
                pid = child.id(),
                timeout_ms = limit.as_millis() as u64,
                "harness timed out; killing"
            );
            if let Err(err) = child.kill() {
                warn!(error = %err, "failed to kill timed-out harness");
            }
            child.wait()?;
            return Ok(true);
        }

        thread::sleep(POLL_INTERVAL.min(limit - elapsed));
    }
}

/// Kills `child` and joins its pipe readers so neither outlives the run.
fn abandon(
    child: &mut Child,
    stdout: Option<thread::JoinHandle<Vec<u8>>>,
    stderr: Option<thread::JoinHandle<Vec<u8>>>,
) {
    if let Err(err) = child.kill() {
        warn!(error = %err, "failed to kill harness");
    }
    let _ = child.wait();
    collect(stdout);
    collect(stderr);
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
