//! Generation configuration.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Knobs for a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Probability of the hepatic-impairment tag
    pub hepatic_probability: f64,
    /// Probability of the renal-impairment tag
    pub renal_probability: f64,
    /// Probability that a person carries one allergen
    pub allergen_probability: f64,
    /// Probability of injecting comorbid history and on-going medication
    pub history_probability: f64,
    /// Enforce the per-diagnosis coverage quota
    pub enforce_quota: bool,
    /// Max accepted records per diagnosis
    pub diagnosis_quota: u32,
    /// Continue from the persisted population and cache
    pub resume: bool,
    pub symptom_max_attempts: u32,
    pub medicine_max_attempts: u32,
    /// Accept the last audited-but-failed pair when the symptom budget runs out
    pub accept_unaudited_on_exhaustion: bool,
    /// Persist every N accepted records (0 = only at the end)
    pub checkpoint_interval: usize,
    /// Stop after this many discarded candidates in a row
    pub max_consecutive_rejections: usize,
    /// RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            hepatic_probability: 0.1,
            renal_probability: 0.1,
            allergen_probability: 0.4,
            history_probability: 0.2,
            enforce_quota: true,
            diagnosis_quota: 2,
            resume: true,
            symptom_max_attempts: 100,
            medicine_max_attempts: 50,
            accept_unaudited_on_exhaustion: true,
            checkpoint_interval: 500,
            max_consecutive_rejections: 1000,
            seed: None,
        }
    }
}

impl GenerationConfig {
    /// Load from a JSON file; missing keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `DRUGREC_*` environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup (environment or test map).
    pub fn with_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        set(&mut self.hepatic_probability, "DRUGREC_HEPATIC_PROB", &lookup)?;
        set(&mut self.renal_probability, "DRUGREC_RENAL_PROB", &lookup)?;
        set(&mut self.allergen_probability, "DRUGREC_ALLERGEN_PROB", &lookup)?;
        set(&mut self.history_probability, "DRUGREC_HISTORY_PROB", &lookup)?;
        set(&mut self.enforce_quota, "DRUGREC_ENFORCE_QUOTA", &lookup)?;
        set(&mut self.diagnosis_quota, "DRUGREC_DIAGNOSIS_QUOTA", &lookup)?;
        set(&mut self.resume, "DRUGREC_RESUME", &lookup)?;
        set(&mut self.symptom_max_attempts, "DRUGREC_SYMPTOM_MAX_ATTEMPTS", &lookup)?;
        set(&mut self.medicine_max_attempts, "DRUGREC_MEDICINE_MAX_ATTEMPTS", &lookup)?;
        set(&mut self.accept_unaudited_on_exhaustion, "DRUGREC_ACCEPT_UNAUDITED", &lookup)?;
        set(&mut self.checkpoint_interval, "DRUGREC_CHECKPOINT_INTERVAL", &lookup)?;
        set(&mut self.max_consecutive_rejections, "DRUGREC_MAX_CONSECUTIVE_REJECTIONS", &lookup)?;
        if let Some(v) = lookup("DRUGREC_SEED") {
            self.seed = Some(parse("DRUGREC_SEED", v)?);
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let probabilities = [
            ("hepatic_probability", self.hepatic_probability),
            ("renal_probability", self.renal_probability),
            ("allergen_probability", self.allergen_probability),
            ("history_probability", self.history_probability),
        ];
        for (key, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    value: p.to_string(),
                });
            }
        }
        let budgets = [
            ("symptom_max_attempts", self.symptom_max_attempts),
            ("medicine_max_attempts", self.medicine_max_attempts),
        ];
        for (key, n) in budgets {
            if n == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    value: "0".into(),
                });
            }
        }
        if self.max_consecutive_rejections == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_consecutive_rejections".into(),
                value: "0".into(),
            });
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: String) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key: key.into(), value })
}

fn set<T, F>(slot: &mut T, key: &str, lookup: &F) -> ConfigResult<()>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(key) {
        *slot = parse(key, v)?;
    }
    Ok(())
}
