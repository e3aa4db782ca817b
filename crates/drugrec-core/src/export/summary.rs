//! Population-level statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{Gender, GroupTag, PatientRecord};

/// Aggregate view of a generated population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSummary {
    pub total_records: usize,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub mean_age: Option<f64>,
    pub male: usize,
    pub female: usize,
    /// Records per group label (age bands and comorbidities)
    pub groups: BTreeMap<String, usize>,
    pub with_allergen: usize,
    pub with_history: usize,
    /// Most frequent diagnoses, descending by count then by name
    pub top_diagnoses: Vec<(String, usize)>,
}

impl PopulationSummary {
    pub fn new(population: &[PatientRecord], top: usize) -> Self {
        let mut groups = BTreeMap::new();
        let mut diagnoses: BTreeMap<&str, usize> = BTreeMap::new();
        let mut male = 0;

        for record in population {
            if record.gender == Gender::Male {
                male += 1;
            }
            for tag in &record.group {
                *groups.entry(tag.label().to_string()).or_insert(0) += 1;
            }
            *diagnoses.entry(record.diagnosis.as_str()).or_insert(0) += 1;
        }

        let mut top_diagnoses: Vec<(String, usize)> = diagnoses
            .into_iter()
            .map(|(d, n)| (d.to_string(), n))
            .collect();
        top_diagnoses.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_diagnoses.truncate(top);

        let ages = population.iter().map(|r| r.age);
        let mean_age = if population.is_empty() {
            None
        } else {
            Some(ages.clone().map(f64::from).sum::<f64>() / population.len() as f64)
        };

        Self {
            total_records: population.len(),
            min_age: ages.clone().min(),
            max_age: ages.max(),
            mean_age,
            male,
            female: population.len() - male,
            groups,
            with_allergen: population.iter().filter(|r| !r.allergen.is_empty()).count(),
            with_history: population.iter().filter(|r| !r.antecedents.is_empty()).count(),
            top_diagnoses,
        }
    }

    pub fn group_count(&self, tag: GroupTag) -> usize {
        self.groups.get(tag.label()).copied().unwrap_or(0)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
