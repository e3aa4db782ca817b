//! DrugRec Synthesis Core Library
//!
//! Generates synthetic patient records for drug-recommendation training data.
//! Every record pairs a sampled person with a plausible diagnosis, symptoms,
//! and a gold medicine set that survives the safety reviews.
//!
//! # Architecture
//!
//! ```text
//! DemographicSampler → age, gender, group tags, allergen
//!           │
//!           ▼
//! SymptomResolver ── rules ──► oracle (symptom) ──► oracle (audit)
//!           │                        ▲
//!           │                  [CallCache]
//!           ▼
//! MedicineResolver → age / special-population / allergy reviews
//!           │            (sentinel "未知疾病" on exhaustion)
//!           ▼
//! ComorbidityInjector → history audit → interaction veto
//!           │
//!           ▼
//! Generator: quota check → commit → checkpoint
//!           │
//!           ▼
//! SQLite: patients │ diagnosis_usage │ call_cache │ generation_runs
//! ```
//!
//! # Modules
//!
//! - [`rules`]: Keyword rule tables for diagnosis and medicine plausibility
//! - [`sampler`]: Demographic sampling
//! - [`cache`]: Oracle call cache
//! - [`knowledge`]: Drug knowledge base reviews
//! - [`resolver`]: Symptom, medicine and comorbidity stages
//! - [`population`]: Quota-enforcing controller
//! - [`db`]: SQLite persistence
//! - [`export`]: JSON/CSV export and summary statistics

pub mod cache;
pub mod config;
pub mod db;
pub mod export;
pub mod knowledge;
pub mod models;
pub mod population;
pub mod resolver;
pub mod retry;
pub mod rules;
pub mod sampler;

// Re-export commonly used types
pub use cache::{CachedCompletion, CallCache};
pub use config::GenerationConfig;
pub use db::Database;
pub use export::{PopulationExport, PopulationSummary};
pub use knowledge::{InMemoryKnowledgeBase, KnowledgeBase};
pub use models::{Catalogs, Demographics, Gender, GroupTag, PatientRecord};
pub use population::{GenerationContext, GenerationReport, Generator};
pub use resolver::{ComorbidityInjector, MedicineResolver, SymptomResolver, UNKNOWN_DIAGNOSIS};
pub use rules::RuleEngine;
pub use sampler::DemographicSampler;

use thiserror::Error;

/// Top-level error for a generation run.
#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] models::CatalogError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] resolver::ResolveError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] drugrec_llm::OracleError),
}

pub type SynthResult<T> = Result<T, SynthError>;

/// Install the `tracing` subscriber, honouring `RUST_LOG` and defaulting to `info`.
/// Safe to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
