//! Population export and summary statistics.

mod population;
mod summary;

pub use population::*;
pub use summary::*;
