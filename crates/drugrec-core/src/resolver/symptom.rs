//! Diagnosis-Symptom resolver.

use drugrec_llm::{
    extract_symptom, parse_audit_output, split_symptoms, AuditRequest, CompletionOracle,
    SymptomRequest,
};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use super::{ResolveError, ResolveResult};
use crate::cache::CachedCompletion;
use crate::models::{Demographics, DiagnosisCatalog};
use crate::retry::{Attempt, OnExhaustion, RetryOutcome, RetryPolicy};
use crate::rules::RuleEngine;

/// A diagnosis with its symptom terms.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisSymptom {
    pub diagnosis: String,
    pub symptom: Vec<String>,
    /// False when accepted without a clean audit
    pub audited: bool,
}

/// Draws diagnoses until one is plausible, narrated and audited clean.
pub struct SymptomResolver<'a> {
    diagnoses: Vec<&'a str>,
    rules: &'a RuleEngine,
    policy: RetryPolicy,
}

impl<'a> SymptomResolver<'a> {
    pub fn new(catalog: &'a DiagnosisCatalog, rules: &'a RuleEngine, policy: RetryPolicy) -> Self {
        Self {
            diagnoses: catalog.diagnoses(),
            rules,
            policy,
        }
    }

    /// Budget and fallback from the generation config.
    pub fn policy_for(max_attempts: u32, accept_on_exhaustion: bool) -> RetryPolicy {
        let on_exhaustion = if accept_on_exhaustion {
            OnExhaustion::AcceptLast
        } else {
            OnExhaustion::Fail
        };
        RetryPolicy::new(max_attempts, on_exhaustion)
    }

    pub fn resolve<O, R>(
        &self,
        person: &Demographics,
        calls: &mut CachedCompletion<'_, O>,
        rng: &mut R,
    ) -> ResolveResult<DiagnosisSymptom>
    where
        O: CompletionOracle + ?Sized,
        R: Rng + ?Sized,
    {
        if self.diagnoses.is_empty() {
            return Err(ResolveError::EmptyCatalog);
        }

        let outcome = self.policy.run(|attempt| self.attempt(person, calls, rng, attempt));
        match outcome {
            RetryOutcome::Accepted { value, attempts } => {
                debug!(diagnosis = %value.diagnosis, attempts, "symptom resolved");
                Ok(value)
            }
            RetryOutcome::Degraded { value, attempts } => {
                warn!(
                    diagnosis = %value.diagnosis,
                    attempts,
                    "symptom budget exhausted, accepting last unaudited pair"
                );
                Ok(value)
            }
            RetryOutcome::Exhausted { attempts } => Err(ResolveError::Exhausted {
                stage: "symptom",
                attempts,
            }),
        }
    }

    fn attempt<O, R>(
        &self,
        person: &Demographics,
        calls: &mut CachedCompletion<'_, O>,
        rng: &mut R,
        attempt: u32,
    ) -> Attempt<DiagnosisSymptom>
    where
        O: CompletionOracle + ?Sized,
        R: Rng + ?Sized,
    {
        let Some(diagnosis) = self.diagnoses.choose(rng).copied() else {
            return Attempt::Retry(None);
        };

        if let Some(rule) = self.rules.diagnosis_violation(diagnosis, person) {
            debug!(diagnosis, attempt, category = rule.category, "implausible diagnosis");
            return Attempt::Retry(None);
        }

        let request = SymptomRequest {
            age: person.age,
            gender: person.gender.label().to_string(),
            groups: person.group_labels(),
            diagnosis: diagnosis.to_string(),
        };
        let narrative = match calls.symptom(&request) {
            Ok(text) => text,
            Err(e) => {
                warn!(diagnosis, attempt, error = %e, "symptom oracle fault");
                return Attempt::Retry(None);
            }
        };
        let symptom = match extract_symptom(&narrative).map(|field| split_symptoms(&field)) {
            Some(terms) if !terms.is_empty() => terms,
            _ => {
                debug!(diagnosis, attempt, "malformed symptom narrative");
                return Attempt::Retry(None);
            }
        };

        let candidate = DiagnosisSymptom {
            diagnosis: diagnosis.to_string(),
            symptom,
            audited: false,
        };
        let audit = AuditRequest {
            age: person.age,
            groups: person.group_labels(),
            gender: person.gender.label().to_string(),
            symptoms: candidate.symptom.clone(),
            diagnosis: candidate.diagnosis.clone(),
            antecedents: Vec::new(),
        };
        let verdict = match calls.audit(&audit).map(|raw| parse_audit_output(&raw)) {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                debug!(diagnosis, attempt, error = %e, "unparseable audit");
                return Attempt::Retry(Some(candidate));
            }
            Err(e) => {
                warn!(diagnosis, attempt, error = %e, "audit oracle fault");
                return Attempt::Retry(Some(candidate));
            }
        };

        if verdict.is_clean() {
            Attempt::Accept(DiagnosisSymptom {
                audited: true,
                ..candidate
            })
        } else {
            debug!(diagnosis, attempt, errors = %verdict, "audit rejected record");
            Attempt::Retry(Some(candidate))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CallCache;
    use crate::models::{CandidateDrug, Gender, GroupTag};
    use drugrec_llm::{MockOracle, OracleError, ScriptedOracle};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn catalog(names: &[&str]) -> DiagnosisCatalog {
        let mut entries = BTreeMap::new();
        for name in names {
            entries.insert(
                name.to_string(),
                vec![CandidateDrug { drug_id: Some("1".into()), name: "药".into() }],
            );
        }
        DiagnosisCatalog::new(entries)
    }

    fn adult_man() -> Demographics {
        Demographics {
            age: 40,
            gender: Gender::Male,
            group: vec![GroupTag::Adult],
            allergen: vec![],
        }
    }

    #[test]
    fn test_accepts_on_first_attempt() {
        let catalog = catalog(&["感冒"]);
        let rules = RuleEngine::new();
        let resolver = SymptomResolver::new(&catalog, &rules, SymptomResolver::policy_for(100, true));
        let oracle = ScriptedOracle::new(
            vec![Ok("40 || 男 || 成人 || 咳嗽、流涕 || 感冒".into()), Ok("输出: 0".into())],
            Err(OracleError::Transport("unexpected call".into())),
        );
        let mut cache = CallCache::new();
        let mut calls = CachedCompletion::new(&oracle, &mut cache);
        let mut rng = StdRng::seed_from_u64(1);

        let pair = resolver.resolve(&adult_man(), &mut calls, &mut rng).unwrap();
        assert_eq!(pair.diagnosis, "感冒");
        assert_eq!(pair.symptom, vec!["咳嗽", "流涕"]);
        assert!(pair.audited);
        assert_eq!(oracle.call_count(), 2);
    }

    #[test]
    fn test_audit_with_preamble_is_not_degraded() {
        let catalog = catalog(&["感冒"]);
        let rules = RuleEngine::new();
        let resolver = SymptomResolver::new(&catalog, &rules, SymptomResolver::policy_for(100, true));
        let oracle = ScriptedOracle::new(
            vec![
                Ok("40 || 男 || 成人 || 咳嗽 || 感冒".into()),
                Ok("好的，检查结果如下\n输出: 0".into()),
            ],
            Err(OracleError::Transport("unexpected call".into())),
        );
        let mut cache = CallCache::new();
        let mut calls = CachedCompletion::new(&oracle, &mut cache);

        let pair = resolver
            .resolve(&adult_man(), &mut calls, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert!(pair.audited);
        assert_eq!(oracle.call_count(), 2);
    }

    #[test]
    fn test_implausible_diagnoses_never_reach_oracle() {
        let catalog = catalog(&["前列腺炎"]);
        let rules = RuleEngine::new();
        let resolver = SymptomResolver::new(&catalog, &rules, SymptomResolver::policy_for(10, true));
        let oracle = MockOracle::default();
        let mut cache = CallCache::new();
        let mut calls = CachedCompletion::new(&oracle, &mut cache);
        let woman = Demographics {
            gender: Gender::Female,
            ..adult_man()
        };

        let result = resolver.resolve(&woman, &mut calls, &mut StdRng::seed_from_u64(2));
        assert_eq!(result, Err(ResolveError::Exhausted { stage: "symptom", attempts: 10 }));
        assert_eq!(oracle.call_count(), 0);
    }

    #[test]
    fn test_degraded_success_after_failed_audits() {
        let catalog = catalog(&["感冒"]);
        let rules = RuleEngine::new();
        let oracle = MockOracle::new("头痛", "3");

        let resolver = SymptomResolver::new(&catalog, &rules, SymptomResolver::policy_for(5, true));
        let mut cache = CallCache::new();
        let pair = resolver
            .resolve(&adult_man(), &mut CachedCompletion::new(&oracle, &mut cache), &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert!(!pair.audited);
        assert_eq!(pair.symptom, vec!["头痛"]);
        // Same prompt every attempt, so the oracle is asked once per mode.
        assert_eq!(oracle.call_count(), 2);

        let strict = SymptomResolver::new(&catalog, &rules, SymptomResolver::policy_for(5, false));
        let result = strict.resolve(
            &adult_man(),
            &mut CachedCompletion::new(&oracle, &mut cache),
            &mut StdRng::seed_from_u64(3),
        );
        assert!(matches!(result, Err(ResolveError::Exhausted { .. })));
    }

    #[test]
    fn test_malformed_narrative_is_retried() {
        let catalog = catalog(&["感冒"]);
        let rules = RuleEngine::new();
        let resolver = SymptomResolver::new(&catalog, &rules, SymptomResolver::policy_for(3, true));
        let oracle = ScriptedOracle::new(vec![], Ok("感冒的症状是咳嗽".into()));
        let mut cache = CallCache::new();
        let result = resolver.resolve(
            &adult_man(),
            &mut CachedCompletion::new(&oracle, &mut cache),
            &mut StdRng::seed_from_u64(4),
        );
        // Nothing well-formed was ever produced, so there is no fallback pair.
        assert!(matches!(result, Err(ResolveError::Exhausted { attempts: 3, .. })));
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = DiagnosisCatalog::default();
        let rules = RuleEngine::new();
        let resolver = SymptomResolver::new(&catalog, &rules, SymptomResolver::policy_for(3, true));
        let oracle = MockOracle::default();
        let mut cache = CallCache::new();
        let result = resolver.resolve(
            &adult_man(),
            &mut CachedCompletion::new(&oracle, &mut cache),
            &mut StdRng::seed_from_u64(5),
        );
        assert_eq!(result, Err(ResolveError::EmptyCatalog));
    }
}
