//! Medicine resolver and safety reviewer.

use std::collections::BTreeSet;

use drugrec_llm::CompletionOracle;
use rand::Rng;
use tracing::{debug, warn};

use super::{DiagnosisSymptom, ResolveError, ResolveResult, SymptomResolver};
use crate::cache::CachedCompletion;
use crate::knowledge::KnowledgeBase;
use crate::models::{Demographics, DiagnosisCatalog, DrugId};
use crate::retry::{Attempt, OnExhaustion, RetryOutcome, RetryPolicy};

/// Diagnosis label returned when the medicine budget runs out.
pub const UNKNOWN_DIAGNOSIS: &str = "未知疾病";

/// A diagnosis with its symptom terms and safety-reviewed medicines.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDiagnosis {
    pub diagnosis: String,
    pub symptom: Vec<String>,
    pub medicine: Vec<DrugId>,
    /// Symptom pair accepted without a clean audit
    pub degraded: bool,
}

impl ResolvedDiagnosis {
    /// Soft-failure sentinel: unknown diagnosis, no medicine.
    pub fn unknown() -> Self {
        Self {
            diagnosis: UNKNOWN_DIAGNOSIS.to_string(),
            symptom: Vec::new(),
            medicine: Vec::new(),
            degraded: false,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.diagnosis == UNKNOWN_DIAGNOSIS && self.medicine.is_empty()
    }
}

/// Resolves a diagnosis to a non-empty set of medicines that pass the
/// age, special-population and allergy reviews.
pub struct MedicineResolver<'a, K: ?Sized> {
    catalog: &'a DiagnosisCatalog,
    knowledge: &'a K,
    symptoms: SymptomResolver<'a>,
    policy: RetryPolicy,
}

impl<'a, K: KnowledgeBase + ?Sized> MedicineResolver<'a, K> {
    pub fn new(
        catalog: &'a DiagnosisCatalog,
        knowledge: &'a K,
        symptoms: SymptomResolver<'a>,
        max_attempts: u32,
    ) -> Self {
        Self {
            catalog,
            knowledge,
            symptoms,
            policy: RetryPolicy::new(max_attempts, OnExhaustion::Fail),
        }
    }

    /// Never fails: exhaustion yields [`ResolvedDiagnosis::unknown`].
    pub fn resolve<O, R>(
        &self,
        person: &Demographics,
        calls: &mut CachedCompletion<'_, O>,
        rng: &mut R,
    ) -> ResolvedDiagnosis
    where
        O: CompletionOracle + ?Sized,
        R: Rng + ?Sized,
    {
        let outcome = self.policy.run(|attempt| match self.attempt(person, calls, rng) {
            Ok(Some(resolved)) => Attempt::Accept(resolved),
            Ok(None) => Attempt::Retry(None),
            Err(e) => {
                warn!(attempt, error = %e, "medicine attempt failed");
                Attempt::Retry(None)
            }
        });

        match outcome {
            RetryOutcome::Accepted { value, attempts } | RetryOutcome::Degraded { value, attempts } => {
                debug!(diagnosis = %value.diagnosis, medicines = value.medicine.len(), attempts, "medicine resolved");
                value
            }
            RetryOutcome::Exhausted { attempts } => {
                warn!(attempts, "medicine budget exhausted, returning unknown diagnosis");
                ResolvedDiagnosis::unknown()
            }
        }
    }

    fn attempt<O, R>(
        &self,
        person: &Demographics,
        calls: &mut CachedCompletion<'_, O>,
        rng: &mut R,
    ) -> ResolveResult<Option<ResolvedDiagnosis>>
    where
        O: CompletionOracle + ?Sized,
        R: Rng + ?Sized,
    {
        let DiagnosisSymptom {
            diagnosis,
            symptom,
            audited,
        } = self.symptoms.resolve(person, calls, rng)?;

        let candidates = self
            .catalog
            .candidate_ids(&diagnosis)
            .ok_or_else(|| ResolveError::CatalogMiss(diagnosis.clone()))?;
        let medicine = self.review(&candidates, person)?;
        if medicine.is_empty() {
            debug!(diagnosis = %diagnosis, candidates = candidates.len(), "no safe medicine");
            return Ok(None);
        }

        Ok(Some(ResolvedDiagnosis {
            diagnosis,
            symptom,
            medicine,
            degraded: !audited,
        }))
    }

    /// Candidates minus everything any review excludes, in catalog order.
    pub fn review(&self, candidates: &[DrugId], person: &Demographics) -> ResolveResult<Vec<DrugId>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let mut excluded: BTreeSet<DrugId> = BTreeSet::new();
        excluded.extend(self.knowledge.age_review(candidates, person)?.failing);
        excluded.extend(self.knowledge.special_population_review(candidates, person)?.failing);
        if !person.allergen.is_empty() {
            excluded.extend(self.knowledge.allergy_review(candidates, &person.allergen)?.failing);
        }

        let mut seen = BTreeSet::new();
        Ok(candidates
            .iter()
            .filter(|id| !excluded.contains(*id) && seen.insert((*id).clone()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CallCache;
    use crate::knowledge::{InMemoryKnowledgeBase, KnowledgeError, KnowledgeResult, Review};
    use crate::models::{CandidateDrug, DrugInfo, Gender, GroupTag, InteractionGraph};
    use crate::rules::RuleEngine;
    use drugrec_llm::MockOracle;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{BTreeMap, HashMap};

    fn catalog(entries: &[(&str, &[&str])]) -> DiagnosisCatalog {
        let mut map = BTreeMap::new();
        for (diagnosis, ids) in entries {
            map.insert(
                diagnosis.to_string(),
                ids.iter()
                    .map(|id| CandidateDrug { drug_id: Some(id.to_string()), name: id.to_string() })
                    .collect(),
            );
        }
        DiagnosisCatalog::new(map)
    }

    fn elderly_man() -> Demographics {
        Demographics {
            age: 70,
            gender: Gender::Male,
            group: vec![GroupTag::Elderly],
            allergen: vec![],
        }
    }

    fn kb() -> InMemoryKnowledgeBase {
        let mut drugs = HashMap::new();
        let mut pen = DrugInfo::new("pen", "青霉素V钾片");
        pen.ingredients = vec!["青霉素".into()];
        drugs.insert(pen.id.clone(), pen);
        drugs.insert("para".into(), DrugInfo::new("para", "对乙酰氨基酚片"));
        InMemoryKnowledgeBase::new(drugs, InteractionGraph::default())
    }

    struct DownKnowledgeBase;

    impl KnowledgeBase for DownKnowledgeBase {
        fn age_review(&self, _: &[DrugId], _: &Demographics) -> KnowledgeResult<Review> {
            Err(KnowledgeError::Unavailable("offline".into()))
        }
        fn special_population_review(&self, _: &[DrugId], _: &Demographics) -> KnowledgeResult<Review> {
            Ok(Review::pass())
        }
        fn allergy_review(&self, _: &[DrugId], _: &[String]) -> KnowledgeResult<Review> {
            Ok(Review::pass())
        }
        fn interaction_check(&self, _: &str, _: &str) -> KnowledgeResult<bool> {
            Ok(false)
        }
        fn drug_detail(&self, _: &str) -> Option<DrugInfo> {
            None
        }
    }

    #[test]
    fn test_review_excludes_gender_and_age_mismatch() {
        let catalog = catalog(&[("发热", &["孕妇专用药", "儿童退热药"])]);
        let rules = RuleEngine::new();
        let kb = kb();
        let symptoms = SymptomResolver::new(&catalog, &rules, SymptomResolver::policy_for(5, true));
        let resolver = MedicineResolver::new(&catalog, &kb, symptoms, 3);

        let candidates: Vec<DrugId> = vec!["孕妇专用药".into(), "儿童退热药".into()];
        let safe = resolver.review(&candidates, &elderly_man()).unwrap();
        assert!(safe.is_empty());

        // Every attempt ends with an empty safe list, so the sentinel comes back.
        let oracle = MockOracle::default();
        let mut cache = CallCache::new();
        let resolved = resolver.resolve(
            &elderly_man(),
            &mut CachedCompletion::new(&oracle, &mut cache),
            &mut StdRng::seed_from_u64(1),
        );
        assert!(resolved.is_unknown());
        assert_eq!(resolved, ResolvedDiagnosis::unknown());
    }

    #[test]
    fn test_allergy_review_only_with_allergen() {
        let catalog = catalog(&[("咽炎", &["pen", "para"])]);
        let rules = RuleEngine::new();
        let kb = kb();
        let symptoms = SymptomResolver::new(&catalog, &rules, SymptomResolver::policy_for(5, true));
        let resolver = MedicineResolver::new(&catalog, &kb, symptoms, 3);
        let candidates: Vec<DrugId> = vec!["pen".into(), "para".into()];

        let mut person = elderly_man();
        assert_eq!(resolver.review(&candidates, &person).unwrap(), candidates);

        person.allergen = vec!["青霉素".into()];
        assert_eq!(resolver.review(&candidates, &person).unwrap(), vec!["para".to_string()]);
    }

    #[test]
    fn test_resolve_returns_safe_set() {
        let catalog = catalog(&[("咽炎", &["pen", "para", "para"])]);
        let rules = RuleEngine::new();
        let kb = kb();
        let symptoms = SymptomResolver::new(&catalog, &rules, SymptomResolver::policy_for(5, true));
        let resolver = MedicineResolver::new(&catalog, &kb, symptoms, 3);
        let oracle = MockOracle::default();
        let mut cache = CallCache::new();

        let resolved = resolver.resolve(
            &elderly_man(),
            &mut CachedCompletion::new(&oracle, &mut cache),
            &mut StdRng::seed_from_u64(9),
        );
        assert_eq!(resolved.diagnosis, "咽炎");
        assert_eq!(resolved.medicine, vec!["pen".to_string(), "para".to_string()]);
        assert_eq!(resolved.symptom, vec!["发热", "乏力"]);
        assert!(!resolved.degraded);
    }

    #[test]
    fn test_knowledge_fault_consumes_attempts() {
        let catalog = catalog(&[("咽炎", &["para"])]);
        let rules = RuleEngine::new();
        let kb = DownKnowledgeBase;
        let symptoms = SymptomResolver::new(&catalog, &rules, SymptomResolver::policy_for(5, true));
        let resolver = MedicineResolver::new(&catalog, &kb, symptoms, 4);
        let oracle = MockOracle::default();
        let mut cache = CallCache::new();

        let resolved = resolver.resolve(
            &elderly_man(),
            &mut CachedCompletion::new(&oracle, &mut cache),
            &mut StdRng::seed_from_u64(2),
        );
        assert!(resolved.is_unknown());
    }

    #[test]
    fn test_catalog_entry_without_ids_yields_sentinel() {
        let mut map = BTreeMap::new();
        map.insert("罕见病".to_string(), vec![CandidateDrug { drug_id: None, name: "无编号".into() }]);
        let catalog = DiagnosisCatalog::new(map);
        let rules = RuleEngine::new();
        let kb = kb();
        let symptoms = SymptomResolver::new(&catalog, &rules, SymptomResolver::policy_for(2, true));
        let resolver = MedicineResolver::new(&catalog, &kb, symptoms, 2);
        let oracle = MockOracle::default();
        let mut cache = CallCache::new();

        let resolved = resolver.resolve(
            &elderly_man(),
            &mut CachedCompletion::new(&oracle, &mut cache),
            &mut StdRng::seed_from_u64(3),
        );
        assert!(resolved.is_unknown());
    }
}
