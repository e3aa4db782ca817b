//! Read-only catalog inputs loaded once per run.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::DrugId;

pub const AGE_DISTRIBUTION_FILE: &str = "age_distribution.json";
pub const ALLERGENS_FILE: &str = "allergens.json";
pub const DIAGNOSIS_MEDICINE_FILE: &str = "diagnosis_medicine.json";
pub const DRUG_INTERACTIONS_FILE: &str = "drug_interactions.json";
pub const DRUGS_FILE: &str = "drugs.json";

/// Catalog loading errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid catalog: {0}")]
    Invalid(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Half-open age range `[start, end)` with a probability mass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeBand {
    pub start: u32,
    pub end: u32,
    pub probability: f64,
}

/// Empirical age distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgeDistribution {
    bands: Vec<AgeBand>,
}

impl AgeDistribution {
    pub fn new(bands: Vec<AgeBand>) -> CatalogResult<Self> {
        let dist = Self { bands };
        dist.validate()?;
        Ok(dist)
    }

    pub fn bands(&self) -> &[AgeBand] {
        &self.bands
    }

    pub fn validate(&self) -> CatalogResult<()> {
        if self.bands.is_empty() {
            return Err(CatalogError::Invalid("age distribution is empty".into()));
        }
        for band in &self.bands {
            if band.end <= band.start {
                return Err(CatalogError::Invalid(format!(
                    "empty age band [{}, {})",
                    band.start, band.end
                )));
            }
            if !band.probability.is_finite() || band.probability < 0.0 {
                return Err(CatalogError::Invalid(format!(
                    "bad probability {} for age band [{}, {})",
                    band.probability, band.start, band.end
                )));
            }
        }
        if self.bands.iter().map(|b| b.probability).sum::<f64>() <= 0.0 {
            return Err(CatalogError::Invalid("age probabilities sum to zero".into()));
        }
        Ok(())
    }
}

/// One candidate medicine listed for a diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDrug {
    /// Knowledge-base id; entries without one cannot be prescribed
    #[serde(default)]
    pub drug_id: Option<DrugId>,
    #[serde(default)]
    pub name: String,
}

/// Diagnosis → candidate medicines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagnosisCatalog {
    entries: BTreeMap<String, Vec<CandidateDrug>>,
}

impl DiagnosisCatalog {
    pub fn new(entries: BTreeMap<String, Vec<CandidateDrug>>) -> Self {
        Self { entries }
    }

    pub fn diagnoses(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Candidate ids for a diagnosis, `None` on a catalog miss.
    pub fn candidate_ids(&self, diagnosis: &str) -> Option<Vec<DrugId>> {
        self.entries.get(diagnosis).map(|drugs| {
            drugs
                .iter()
                .filter_map(|d| d.drug_id.clone())
                .collect()
        })
    }
}

/// How strongly a drug is cautioned for a population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CautionLevel {
    Forbidden,
    Caution,
}

/// A population caution attached to a drug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caution {
    /// Population label, e.g. "孕妇" or "肾功能不全"
    pub crowd: String,
    pub level: CautionLevel,
}

/// Knowledge-base description of a drug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugInfo {
    pub id: DrugId,
    pub name: String,
    /// Treatment indications
    #[serde(default)]
    pub treats: Vec<String>,
    #[serde(default)]
    pub cautions: Vec<Caution>,
    #[serde(default)]
    pub ingredients: Vec<String>,
}

impl DrugInfo {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            treats: Vec::new(),
            cautions: Vec::new(),
            ingredients: Vec::new(),
        }
    }

    /// True if the drug is forbidden for a population label.
    pub fn is_forbidden_for(&self, crowd: &str) -> bool {
        self.cautions
            .iter()
            .any(|c| c.level == CautionLevel::Forbidden && c.crowd == crowd)
    }
}

/// Drug → known interacting drugs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionGraph {
    edges: HashMap<DrugId, Vec<DrugId>>,
}

impl InteractionGraph {
    pub fn new(edges: HashMap<DrugId, Vec<DrugId>>) -> Self {
        Self { edges }
    }

    /// Add an undirected interaction edge.
    pub fn add_interaction(&mut self, a: &str, b: &str) {
        self.edges.entry(a.to_string()).or_default().push(b.to_string());
        self.edges.entry(b.to_string()).or_default().push(a.to_string());
    }

    pub fn interacting(&self, drug: &str) -> &[DrugId] {
        self.edges.get(drug).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Symmetric lookup.
    pub fn interacts(&self, a: &str, b: &str) -> bool {
        self.interacting(a).iter().any(|d| d == b) || self.interacting(b).iter().any(|d| d == a)
    }
}

/// All read-only inputs for a generation run.
#[derive(Debug, Clone)]
pub struct Catalogs {
    pub age_distribution: AgeDistribution,
    pub allergens: Vec<String>,
    pub diagnoses: DiagnosisCatalog,
    pub interactions: InteractionGraph,
    pub drugs: HashMap<DrugId, DrugInfo>,
}

impl Catalogs {
    /// Load every catalog file from a data directory.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> CatalogResult<Self> {
        let dir = dir.as_ref();
        let age_distribution: AgeDistribution = read_json(&dir.join(AGE_DISTRIBUTION_FILE))?;
        age_distribution.validate()?;
        let allergens: Vec<String> = read_json(&dir.join(ALLERGENS_FILE))?;
        let diagnoses: DiagnosisCatalog = read_json(&dir.join(DIAGNOSIS_MEDICINE_FILE))?;
        if diagnoses.is_empty() {
            return Err(CatalogError::Invalid("diagnosis catalog is empty".into()));
        }
        let interactions: InteractionGraph = read_json(&dir.join(DRUG_INTERACTIONS_FILE))?;
        let drug_list: Vec<DrugInfo> = read_json(&dir.join(DRUGS_FILE))?;

        Ok(Self {
            age_distribution,
            allergens,
            diagnoses,
            interactions,
            drugs: drug_list.into_iter().map(|d| (d.id.clone(), d)).collect(),
        })
    }

    /// Treatment indications for a drug, empty on a miss.
    pub fn indications(&self, drug: &str) -> &[String] {
        self.drugs.get(drug).map(|d| d.treats.as_slice()).unwrap_or(&[])
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CatalogResult<T> {
    let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CatalogError::Json {
        path: path.display().to_string(),
        source,
    })
}
