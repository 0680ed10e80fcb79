use serde::{Deserialize, Serialize};

use crate::store::ProblemId;

/// Input/expected-output rows used to check a candidate mechanically.
///
/// `inputs[i]` is the argument tuple passed to `function_name` and must
/// evaluate equal to `outputs[i]`. Both are stored as source literals
/// wrapped in one extra pair of delimiters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFixture {
    pub id: ProblemId,
    pub function_name: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// One row of a fixture with delimiters already stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureCase<'a> {
    pub index: usize,
    pub args: &'a str,
    pub expected: &'a str,
}

impl TestFixture {
    pub fn new(
        id: ProblemId,
        function_name: impl Into<String>,
        inputs: Vec<String>,
        outputs: Vec<String>,
    ) -> Self {
        Self {
            id,
            function_name: function_name.into(),
            inputs,
            outputs,
        }
    }

    /// Number of usable rows. Unpaired trailing rows are ignored.
    pub fn len(&self) -> usize {
        self.inputs.len().min(self.outputs.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cases(&self) -> impl Iterator<Item = FixtureCase<'_>> {
        self.inputs
            .iter()
            .zip(self.outputs.iter())
            .enumerate()
            .map(|(index, (input, output))| FixtureCase {
                index,
                args: strip_outer(input),
                expected: strip_outer(output),
            })
    }
}

/// Removes one enclosing `()`, `[]` or `{}` pair from a literal.
///
/// The pair is only removed when the first delimiter is closed by the last
/// character; `[1], [2]` and bare scalars come back unchanged.
pub fn strip_outer(literal: &str) -> &str {
    let s = literal.trim();

    let close = match s.chars().next() {
        Some('(') => ')',
        Some('[') => ']',
        Some('{') => '}',
        _ => return s,
    };
    if s.len() < 2 || !s.ends_with(close) {
        return s;
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return if i + c.len_utf8() == s.len() {
                        &s[1..i]
                    } else {
                        s
                    };
                }
            }
            _ => {}
        }
    }

    s
}
