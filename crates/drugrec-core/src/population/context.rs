//! Shared state threaded through a generation run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cache::CallCache;
use crate::models::PatientRecord;

/// Diagnosis → accepted record count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagnosisUsage {
    counts: BTreeMap<String, u32>,
}

impl DiagnosisUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts derived from an existing population.
    pub fn from_population(population: &[PatientRecord]) -> Self {
        let mut usage = Self::new();
        for record in population {
            usage.increment(&record.diagnosis);
        }
        usage
    }

    pub fn count(&self, diagnosis: &str) -> u32 {
        self.counts.get(diagnosis).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, diagnosis: &str) -> u32 {
        let count = self.counts.entry(diagnosis.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn has_reached(&self, diagnosis: &str, quota: u32) -> bool {
        self.count(diagnosis) >= quota
    }

    /// True when every listed diagnosis is at quota.
    pub fn all_reached<'a, I>(&self, diagnoses: I, quota: u32) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        diagnoses.into_iter().all(|d| self.has_reached(d, quota))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn total(&self) -> u64 {
        self.counts.values().map(|&c| u64::from(c)).sum()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl FromIterator<(String, u32)> for DiagnosisUsage {
    fn from_iter<T: IntoIterator<Item = (String, u32)>>(iter: T) -> Self {
        Self {
            counts: iter.into_iter().collect(),
        }
    }
}

/// Population, usage counter and call cache for one run.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    pub population: Vec<PatientRecord>,
    pub usage: DiagnosisUsage,
    pub cache: CallCache,
}

impl GenerationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from persisted state; usage is re-derived from the population.
    pub fn resume(population: Vec<PatientRecord>, cache: CallCache) -> Self {
        let usage = DiagnosisUsage::from_population(&population);
        Self {
            population,
            usage,
            cache,
        }
    }

    /// Id for the next record: one past the highest existing id.
    pub fn next_id(&self) -> u64 {
        self.population.iter().map(|r| r.id + 1).max().unwrap_or(0)
    }

    pub fn commit(&mut self, record: PatientRecord) {
        self.usage.increment(&record.diagnosis);
        self.population.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, GroupTag};

    fn record(id: u64, diagnosis: &str) -> PatientRecord {
        PatientRecord {
            id,
            age: 30,
            gender: Gender::Male,
            group: vec![GroupTag::Adult],
            diagnosis: diagnosis.into(),
            symptom: vec!["咳嗽".into()],
            allergen: vec![],
            medicine: vec!["1".into()],
            antecedents: vec![],
            on_medicine: vec![],
        }
    }

    #[test]
    fn test_usage_from_population() {
        let population = vec![record(0, "感冒"), record(1, "感冒"), record(2, "胃炎")];
        let usage = DiagnosisUsage::from_population(&population);
        assert_eq!(usage.count("感冒"), 2);
        assert_eq!(usage.count("胃炎"), 1);
        assert_eq!(usage.count("肺炎"), 0);
        assert_eq!(usage.total(), 3);
        assert!(usage.has_reached("感冒", 2));
        assert!(!usage.has_reached("胃炎", 2));
        assert!(!usage.all_reached(["感冒", "胃炎"], 2));
        assert!(usage.all_reached(["感冒"], 2));
    }

    #[test]
    fn test_next_id_continues_after_max() {
        let mut ctx = GenerationContext::new();
        assert_eq!(ctx.next_id(), 0);
        ctx = GenerationContext::resume(vec![record(4, "感冒"), record(9, "胃炎")], CallCache::new());
        assert_eq!(ctx.next_id(), 10);
        ctx.commit(record(10, "感冒"));
        assert_eq!(ctx.next_id(), 11);
        assert_eq!(ctx.usage.count("感冒"), 2);
    }
}
