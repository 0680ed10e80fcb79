use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which of the two generated solutions a value refers to.
///
/// Also used as the stored preference: `Version1` persists as `0`,
/// `Version2` as `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CandidateSlot {
    Version1,
    Version2,
}

impl CandidateSlot {
    pub const ALL: [CandidateSlot; 2] = [CandidateSlot::Version1, CandidateSlot::Version2];

    /// 1-based number used in labels and file names.
    pub fn number(self) -> u8 {
        match self {
            CandidateSlot::Version1 => 1,
            CandidateSlot::Version2 => 2,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(CandidateSlot::Version1),
            2 => Some(CandidateSlot::Version2),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CandidateSlot::Version1 => "version1",
            CandidateSlot::Version2 => "version2",
        }
    }

    /// Module name the solution file is importable as.
    pub fn solution_module(self) -> String {
        format!("solution{}", self.number())
    }

    pub fn test_module(self) -> String {
        format!("test{}", self.number())
    }
}

impl fmt::Display for CandidateSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<u8> for CandidateSlot {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CandidateSlot::Version1),
            1 => Ok(CandidateSlot::Version2),
            other => Err(format!("invalid preference index: {other}")),
        }
    }
}

impl From<CandidateSlot> for u8 {
    fn from(slot: CandidateSlot) -> Self {
        slot.number() - 1
    }
}

/// The two competing solutions produced by one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePair {
    pub version1: String,
    pub version2: String,
}

impl CandidatePair {
    pub fn new(version1: impl Into<String>, version2: impl Into<String>) -> Self {
        Self {
            version1: version1.into(),
            version2: version2.into(),
        }
    }

    pub fn get(&self, slot: CandidateSlot) -> &str {
        match slot {
            CandidateSlot::Version1 => &self.version1,
            CandidateSlot::Version2 => &self.version2,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (CandidateSlot, &str)> {
        CandidateSlot::ALL.into_iter().map(move |slot| (slot, self.get(slot)))
    }

    /// Stable identity of this exact pair of sources.
    pub fn fingerprint(&self) -> String {
        let mut h = Sha256::new();
        h.update(self.version1.as_bytes());
        h.update([0u8]);
        h.update(self.version2.as_bytes());
        hex::encode(h.finalize())
    }
}

/// Name of the first `def name(` found in `code`, if any.
pub fn extract_function_name(code: &str) -> Option<String> {
    let flat = code.replace('\n', "");
    let re = Regex::new(r"def (\w+)\(").ok()?;
    re.captures(&flat)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
