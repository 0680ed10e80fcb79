use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::testgen::candidate::CandidateSlot;
use crate::testgen::fixture::TestFixture;

/// Files written for one candidate run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessFiles {
    pub solution: PathBuf,
    pub test: PathBuf,
}

/* ============================================================
   Public entry
   ============================================================ */

/// Writes the candidate source and its generated unittest module into
/// `workdir`, overwriting whatever a previous run left there.
pub fn materialize_harness(
    workdir: &Path,
    slot: CandidateSlot,
    code: &str,
    fixture: &TestFixture,
) -> io::Result<HarnessFiles> {
    let module = slot.solution_module();
    let solution = workdir.join(format!("{module}.py"));
    let test = workdir.join(format!("{}.py", slot.test_module()));

    ensure_parent_dir(&solution)?;
    fs::write(&solution, code)?;
    fs::write(&test, render_test_module(&module, fixture))?;

    debug!(
        solution = %solution.display(),
        test = %test.display(),
        cases = fixture.len(),
        "materialized harness"
    );

    Ok(HarnessFiles { solution, test })
}

/* ============================================================
   Test module rendering
   ============================================================ */

/// Python unittest module with one method per fixture row.
///
/// Methods are named `test_<fn>_<idx>` with `idx` zero-padded so that
/// unittest's alphabetical ordering equals fixture order.
pub fn render_test_module(module: &str, fixture: &TestFixture) -> String {
    let function = &fixture.function_name;
    let method_stem = sanitize_name(function);
    let width = index_width(fixture.len());

    let mut cases = String::new();
    for case in fixture.cases() {
        cases.push_str(&format!(
            "    def test_{method_stem}_{idx:0width$}(self):\n",
            idx = case.index,
        ));
        cases.push_str(&format!(
            "        self.assertEqual({function}({}), {})\n\n",
            case.args, case.expected
        ));
    }
    if cases.is_empty() {
        cases.push_str("    pass\n\n");
    }

    format!(
        "import unittest\n\
         from {module} import {function}\n\
         \n\
         \n\
         class TestSolution(unittest.TestCase):\n\
         {cases}\
         \n\
         if __name__ == \"__main__\":\n\
         \x20   unittest.main()\n"
    )
}

/* ============================================================
   Helpers
   ============================================================ */

fn index_width(len: usize) -> usize {
    len.saturating_sub(1).to_string().len()
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn sanitize_name(name: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if name.is_empty() {
        "case".to_string()
    } else {
        name
    }
}
