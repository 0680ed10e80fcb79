// Recovers the two fenced solutions from a raw streamed generation body.
//
// The body is newline-delimited JSON, one `{"response": .., "done": ..}`
// object per chunk. When a chunk's text starts with a raw newline the
// transport emits the object split across two lines, the first ending in
// `"response":"`. Only single-point splits are handled: a second dangling
// line before the continuation replaces the first.

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::testgen::candidate::CandidatePair;

const SPLIT_SUFFIX: &str = "\"response\":\"";
const FENCE: &str = "```";

#[derive(Debug, Error)]
pub enum ExtractError {
    /// `text` is everything accumulated before the failure.
    #[error("malformed payload: {reason}")]
    MalformedPayload { reason: String, text: String },
}

impl ExtractError {
    pub fn text(&self) -> &str {
        match self {
            ExtractError::MalformedPayload { text, .. } => text,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Chunk {
    #[serde(default)]
    response: String,
    done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StreamState {
    AwaitingChunk,
    Stitching(String),
}

/// Line-fed reassembler for a streamed generation body.
#[derive(Debug)]
pub struct ChunkStream {
    state: StreamState,
    text: String,
    line_no: usize,
}

impl Default for ChunkStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStream {
    pub fn new() -> Self {
        Self {
            state: StreamState::AwaitingChunk,
            text: String::new(),
            line_no: 0,
        }
    }

    /// Consumes one line of the body (without its terminator).
    pub fn feed(&mut self, line: &str) -> Result<(), ExtractError> {
        self.line_no += 1;

        if line.ends_with(SPLIT_SUFFIX) {
            if let StreamState::Stitching(_) = self.state {
                warn!(line = self.line_no, "consecutive split chunks; dropping earlier prefix");
            }
            self.state = StreamState::Stitching(line.to_string());
            return Ok(());
        }

        let line = match std::mem::replace(&mut self.state, StreamState::AwaitingChunk) {
            StreamState::Stitching(prefix) => {
                self.text.push('\n');
                prefix + line
            }
            StreamState::AwaitingChunk => line.to_string(),
        };

        if line.is_empty() {
            return Ok(());
        }

        let chunk: Chunk = serde_json::from_str(&fix_quote(&line)).map_err(|e| {
            self.malformed(format!("chunk on line {} is not valid JSON: {e}", self.line_no))
        })?;

        if !chunk.done {
            self.text.push_str(&chunk.response);
        }
        Ok(())
    }

    pub fn finish(self) -> Result<String, ExtractError> {
        if let StreamState::Stitching(_) = self.state {
            return Err(self.malformed("payload ends inside a split chunk".to_string()));
        }
        Ok(self.text)
    }

    fn malformed(&self, reason: String) -> ExtractError {
        ExtractError::MalformedPayload {
            reason,
            text: self.text.clone(),
        }
    }
}

/// Repairs the doubled-quote artifacts around parentheses.
///
/// Applied until nothing changes, so a repaired line is returned unchanged.
pub fn fix_quote(line: &str) -> String {
    let mut current = line.to_string();
    loop {
        let next = current
            .replace("\"(\"\"", "\"(\"")
            .replace("\"\")\"", "\")\"");
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Reassembles the streamed text of `raw`.
pub fn accumulate(raw: &str) -> Result<String, ExtractError> {
    let mut stream = ChunkStream::new();
    for line in raw.lines() {
        stream.feed(line)?;
    }
    stream.finish()
}

/// Parses a raw generation body into its two fenced solutions.
///
/// Fails unless the text holds at least two fenced blocks; no partial
/// result is ever returned.
pub fn extract(raw: &str) -> Result<CandidatePair, ExtractError> {
    let text = accumulate(raw)?;
    let segments: Vec<&str> = text.split(FENCE).collect();

    if segments.len() < 4 {
        warn!(fences = segments.len() - 1, "generation did not contain two fenced blocks");
        return Err(ExtractError::MalformedPayload {
            reason: format!(
                "expected two fenced code blocks, found {} fence marker(s)",
                segments.len() - 1
            ),
            text,
        });
    }

    let pair = CandidatePair::new(fence_body(segments[1]), fence_body(segments[3]));
    debug!(
        version1_len = pair.version1.len(),
        version2_len = pair.version2.len(),
        "extracted candidate pair"
    );
    Ok(pair)
}

/// Info strings models put after an opening fence.
const LANGUAGE_TAGS: &[&str] = &["python", "python3", "python2", "py", "py3", "pycon", "ipython"];

/// Drops the rest of the opening fence line when it is empty or a known
/// language tag. Anything else on that line is code and is kept.
fn fence_body(segment: &str) -> &str {
    let Some(newline) = segment.find('\n') else {
        return segment;
    };

    let info = segment[..newline].trim();
    let is_info_string =
        info.is_empty() || LANGUAGE_TAGS.iter().any(|tag| info.eq_ignore_ascii_case(tag));

    if is_info_string {
        &segment[newline + 1..]
    } else {
        segment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> String {
        serde_json::json!({ "response": text, "done": false }).to_string()
    }

    fn body(chunks: &[&str]) -> String {
        let mut lines: Vec<String> = chunks.iter().map(|c| chunk(c)).collect();
        lines.push(r#"{"response":"","done":true}"#.to_string());
        lines.join("\n")
    }

    #[test]
    fn two_fenced_blocks() {
        let raw = [
            r#"{"response":"```\n","done":false}"#,
            r#"{"response":"def add(a,b): return a+b\n","done":false}"#,
            r#"{"response":"```\n...\n```","done":false}"#,
            r#"{"response":"def add2(a,b): return a-b","done":false}"#,
            r#"{"response":"```","done":false}"#,
            r#"{"response":"","done":true}"#,
        ]
        .join("\n");

        let pair = extract(&raw).unwrap();
        assert_eq!(pair.version1, "def add(a,b): return a+b\n");
        assert_eq!(pair.version2, "def add2(a,b): return a-b");
    }

    #[test]
    fn chunk_boundaries_do_not_matter() {
        let text = "Here:\n```python\ndef f(x):\n    return  x * 2\n```\nor\n```\ndef f(x):\n\treturn x + x\n```\n";
        let whole = body(&[text]);
        let by_char: Vec<String> = text.chars().map(|c| c.to_string()).collect();
        let refs: Vec<&str> = by_char.iter().map(String::as_str).collect();
        let split = body(&refs);

        let a = extract(&whole).unwrap();
        let b = extract(&split).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.version1, "def f(x):\n    return  x * 2\n");
        assert_eq!(a.version2, "def f(x):\n\treturn x + x\n");
    }

    #[test]
    fn split_chunk_is_stitched_with_newline() {
        let raw = [
            r#"{"response":"```","done":false}"#,
            r#"{"model":"codellama","response":""#,
            r#"","done":false}"#,
            r#"{"response":"x = 1","done":false}"#,
            r#"{"response":"```\n```","done":false}"#,
            r#"{"response":"y = 2```","done":false}"#,
        ]
        .join("\n");

        assert_eq!(accumulate(&raw).unwrap(), "```\nx = 1```\n```y = 2```");
        let pair = extract(&raw).unwrap();
        assert_eq!(pair.version1, "x = 1");
        assert_eq!(pair.version2, "y = 2");
    }

    #[test]
    fn fewer_than_two_blocks_fails() {
        let raw = body(&["```\ndef only(): pass\n```\n"]);
        let err = extract(&raw).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedPayload { .. }));
        assert_eq!(err.text(), "```\ndef only(): pass\n```\n");

        assert!(extract(&body(&["no code at all"])).is_err());
        assert!(extract("").is_err());
    }

    #[test]
    fn invalid_chunk_fails_whole_extraction() {
        let raw = format!("{}\nnot json\n{}", chunk("```a```b```"), chunk("c```"));
        let err = extract(&raw).unwrap_err();
        let ExtractError::MalformedPayload { reason, text } = err;
        assert!(reason.contains("line 2"));
        assert_eq!(text, "```a```b```");
    }

    #[test]
    fn dangling_split_at_end_fails() {
        let raw = format!("{}\n{}", chunk("```a```b```c```"), r#"{"response":""#);
        assert!(extract(&raw).is_err());
    }

    #[test]
    fn done_chunk_contributes_nothing() {
        let raw = format!(
            "{}\n{}\n\n",
            chunk("abc"),
            r#"{"response":"ignored","done":true}"#
        );
        assert_eq!(accumulate(&raw).unwrap(), "abc");
    }

    #[test]
    fn quote_repair() {
        assert_eq!(fix_quote(r#"{"response":"(""}"#), r#"{"response":"("}"#);
        assert_eq!(fix_quote(r#"{"response":"")"}"#), r#"{"response":")"}"#);
    }

    #[test]
    fn quote_repair_is_idempotent() {
        for line in [
            r#"{"response":"(""","done":false}"#,
            r#"{"response":"")"","done":false}"#,
            r#"{"response":"print(""))","done":false}"#,
            r#"{"response":"plain","done":false}"#,
        ] {
            let once = fix_quote(line);
            assert_eq!(fix_quote(&once), once);
        }
        assert_eq!(
            fix_quote(r#"{"response":"(""","done":false}"#),
            r#"{"response":"(","done":false}"#
        );
    }

    #[test]
    fn language_tag_is_not_code() {
        assert_eq!(fence_body("python\nx = 1\n"), "x = 1\n");
        assert_eq!(fence_body("\nx = 1\n"), "x = 1\n");
        assert_eq!(fence_body("x = 1\ny = 2\n"), "x = 1\ny = 2\n");
        assert_eq!(fence_body("x = 1"), "x = 1");
        assert_eq!(fence_body("Python3\r\nx = 1\n"), "x = 1\n");
    }

    #[test]
    fn statement_on_fence_line_is_kept() {
        let raw = body(&["Here:\n```pass\nx = 1\n```\nor\n```\ny = 2\n```"]);
        let pair = extract(&raw).unwrap();
        assert_eq!(pair.version1, "pass\nx = 1\n");
        assert_eq!(pair.version2, "y = 2\n");

        for line in ["main", "x", "#todo"] {
            let segment = format!("{line}\nrest\n");
            assert_eq!(fence_body(&segment), segment);
        }
    }

    #[test]
    fn second_split_replaces_buffered_prefix() {
        let raw = [
            r#"{"response":"```","done":false}"#,
            r#"{"model":"first","response":""#,
            r#"{"model":"second","response":""#,
            r#"x = 1","done":false}"#,
            r#"{"response":"``` ```y = 2```","done":false}"#,
        ]
        .join("\n");

        let text = accumulate(&raw).unwrap();
        assert_eq!(text, "```\nx = 1``` ```y = 2```");
        assert_eq!(text.matches('\n').count(), 1);

        let pair = extract(&raw).unwrap();
        assert_eq!(pair.version1, "x = 1");
        assert_eq!(pair.version2, "y = 2");
    }
}
