//! Domain models for synthetic patient generation.

mod catalog;
mod patient;

pub use catalog::*;
pub use patient::*;
