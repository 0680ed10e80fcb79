//! Preference labeling for pairs of LLM-generated solutions.
//!
//! A raw streamed generation body is turned into two candidate programs
//! ([`llm::stream::extract`]); each candidate is checked against a problem's
//! fixture in a child interpreter ([`testgen::runner::HarnessRunner`]); the
//! human's choice is written through the [`store`] traits.

pub mod config;
pub mod llm;
pub mod logger;
pub mod state;
pub mod store;
pub mod testgen;
