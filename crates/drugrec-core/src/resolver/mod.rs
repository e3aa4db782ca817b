//! Record resolvers.
//!
//! Pipeline per record: Diagnosis-Symptom → Medicine + Safety Review → Comorbidity

mod comorbidity;
mod medicine;
mod symptom;

pub use comorbidity::*;
pub use medicine::*;
pub use symptom::*;

use drugrec_llm::{ExtractionError, OracleError};
use thiserror::Error;

use crate::knowledge::KnowledgeError;

/// Resolver errors. None of these escape the population controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("Completion oracle fault: {0}")]
    Oracle(#[from] OracleError),

    #[error("Knowledge base fault: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("Malformed oracle output: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("No catalog entry for: {0}")]
    CatalogMiss(String),

    #[error("Diagnosis catalog is empty")]
    EmptyCatalog,

    #[error("{stage} budget exhausted after {attempts} attempts")]
    Exhausted { stage: &'static str, attempts: u32 },
}

pub type ResolveResult<T> = Result<T, ResolveError>;
