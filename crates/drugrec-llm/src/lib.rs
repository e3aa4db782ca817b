//! Completion-oracle layer for synthetic patient generation.
//!
//! This crate owns the prompt templates for symptom narration and record
//! auditing, the parsers for what the oracle sends back, and the
//! [`CompletionOracle`] contract the generation engine calls through.

pub mod extraction;
pub mod oracle;
pub mod prompts;

pub use extraction::*;
pub use oracle::*;
pub use prompts::*;
