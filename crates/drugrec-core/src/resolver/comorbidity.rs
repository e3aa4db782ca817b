//! Comorbidity injection and interaction reconciliation.

use drugrec_llm::{parse_audit_output, AuditRequest, CompletionOracle};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::cache::CachedCompletion;
use crate::knowledge::KnowledgeBase;
use crate::models::{Catalogs, DrugId, PatientRecord};

/// What injection did to a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InjectionReport {
    /// Gold-set entries an interacting partner was drawn for
    pub selected: Vec<DrugId>,
    /// Antecedents dropped because the audit flagged them
    pub antecedents_cleared: bool,
    /// Gold-set ids removed by interaction reconciliation
    pub removed: Vec<DrugId>,
}

/// Number of gold-set entries to draw partners for.
pub fn secondary_count<R: Rng + ?Sized>(gold_len: usize, rng: &mut R) -> usize {
    match gold_len {
        0 | 1 => 0,
        2..=4 => 1,
        n => rng.gen_range(1..=n.min(3)),
    }
}

/// Adds on-going medication and history to a record, then removes any
/// gold medicine that interacts with it.
pub struct ComorbidityInjector<'a, K: ?Sized> {
    catalogs: &'a Catalogs,
    knowledge: &'a K,
}

impl<'a, K: KnowledgeBase + ?Sized> ComorbidityInjector<'a, K> {
    pub fn new(catalogs: &'a Catalogs, knowledge: &'a K) -> Self {
        Self { catalogs, knowledge }
    }

    pub fn inject<O, R>(
        &self,
        record: &mut PatientRecord,
        calls: &mut CachedCompletion<'_, O>,
        rng: &mut R,
    ) -> InjectionReport
    where
        O: CompletionOracle + ?Sized,
        R: Rng + ?Sized,
    {
        let mut report = InjectionReport::default();
        let count = secondary_count(record.medicine.len(), rng);
        let selected: Vec<DrugId> = record.medicine.choose_multiple(rng, count).cloned().collect();

        for gold in &selected {
            let Some(partner) = self.catalogs.interactions.interacting(gold).choose(rng) else {
                continue;
            };
            if let Some(indication) = self.catalogs.indications(partner).choose(rng) {
                if !record.antecedents.contains(indication) {
                    record.antecedents.push(indication.clone());
                }
            }
            if !record.on_medicine.contains(partner) {
                record.on_medicine.push(partner.clone());
            }
        }
        report.selected = selected;

        if !record.antecedents.is_empty() {
            report.antecedents_cleared = self.audit_history(record, calls);
        }
        report.removed = self.reconcile(record);
        report
    }

    /// Audit the record with its history; a non-clean verdict clears the
    /// antecedents but keeps the on-going medication. Returns true if cleared.
    fn audit_history<O>(&self, record: &mut PatientRecord, calls: &mut CachedCompletion<'_, O>) -> bool
    where
        O: CompletionOracle + ?Sized,
    {
        let request = AuditRequest {
            age: record.age,
            groups: record.demographics().group_labels(),
            gender: record.gender.label().to_string(),
            symptoms: record.symptom.clone(),
            diagnosis: record.diagnosis.clone(),
            antecedents: record.antecedents.clone(),
        };
        match calls.audit(&request).map(|raw| parse_audit_output(&raw)) {
            Ok(Ok(verdict)) if verdict.is_clean() => false,
            Ok(Ok(verdict)) => {
                debug!(record_id = record.id, errors = %verdict, "history rejected by audit");
                record.antecedents.clear();
                true
            }
            Ok(Err(e)) => {
                warn!(record_id = record.id, error = %e, "unparseable history audit, keeping history");
                false
            }
            Err(e) => {
                warn!(record_id = record.id, error = %e, "history audit fault, keeping history");
                false
            }
        }
    }

    /// Remove every gold id that any on-going medication interacts with.
    /// One flagged partner is enough; a failed check counts as flagged.
    pub fn reconcile(&self, record: &mut PatientRecord) -> Vec<DrugId> {
        if record.on_medicine.is_empty() {
            return Vec::new();
        }
        let mut removed = Vec::new();
        for gold in &record.medicine {
            let flagged = record.on_medicine.iter().any(|partner| {
                if partner == gold {
                    return true;
                }
                match self.knowledge.interaction_check(gold, partner) {
                    Ok(interacts) => interacts,
                    Err(e) => {
                        warn!(record_id = record.id, gold = %gold, partner = %partner, error = %e, "interaction check fault");
                        true
                    }
                }
            });
            if flagged {
                removed.push(gold.clone());
            }
        }
        record.medicine.retain(|id| !removed.contains(id));
        if !removed.is_empty() {
            debug!(record_id = record.id, removed = ?removed, "interacting medicines removed");
        }
        removed
    }
}
