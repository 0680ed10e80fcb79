pub mod candidate;
pub mod fixture;
pub mod materialize;
pub mod runner;

pub use candidate::{extract_function_name, CandidatePair, CandidateSlot};
pub use fixture::{strip_outer, TestFixture};
pub use runner::{HarnessError, HarnessRunner, Outcome, TestReport};
