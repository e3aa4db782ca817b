//! Knowledge-base reviewer: drug safety reviews and interaction checks.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::models::{Catalogs, Demographics, DrugId, DrugInfo, InteractionGraph};
use crate::rules::{RuleEngine, RuleFamily};

/// Knowledge-base faults. Callers treat them like any other oracle fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeError {
    #[error("Knowledge base unavailable: {0}")]
    Unavailable(String),

    #[error("Knowledge base returned no answer for {0}")]
    EmptyResponse(String),
}

pub type KnowledgeResult<T> = Result<T, KnowledgeError>;

/// Outcome of one safety review over a candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    /// True when no candidate failed
    pub passed: bool,
    /// Ids to exclude
    pub failing: BTreeSet<DrugId>,
}

impl Review {
    pub fn from_failing(failing: BTreeSet<DrugId>) -> Self {
        Self {
            passed: failing.is_empty(),
            failing,
        }
    }

    pub fn pass() -> Self {
        Self::from_failing(BTreeSet::new())
    }
}

/// Drug knowledge consulted by the medicine resolver and comorbidity injector.
pub trait KnowledgeBase {
    /// Exclude medicines unsuitable for the person's age.
    fn age_review(&self, medicines: &[DrugId], person: &Demographics) -> KnowledgeResult<Review>;

    /// Exclude medicines unsuitable for gender, pregnancy, lactation or
    /// the person's comorbidity tags.
    fn special_population_review(
        &self,
        medicines: &[DrugId],
        person: &Demographics,
    ) -> KnowledgeResult<Review>;

    /// Exclude medicines containing any of the allergens.
    fn allergy_review(&self, medicines: &[DrugId], allergens: &[String]) -> KnowledgeResult<Review>;

    /// True if the two drugs are known to interact.
    fn interaction_check(&self, a: &str, b: &str) -> KnowledgeResult<bool>;

    fn drug_detail(&self, id: &str) -> Option<DrugInfo>;
}

/// Knowledge base backed by the loaded catalogs and the medicine rule table.
#[derive(Debug, Clone)]
pub struct InMemoryKnowledgeBase {
    drugs: HashMap<DrugId, DrugInfo>,
    interactions: InteractionGraph,
    rules: RuleEngine,
}

impl InMemoryKnowledgeBase {
    pub fn new(drugs: HashMap<DrugId, DrugInfo>, interactions: InteractionGraph) -> Self {
        Self {
            drugs,
            interactions,
            rules: RuleEngine::new(),
        }
    }

    pub fn from_catalogs(catalogs: &Catalogs) -> Self {
        Self::new(catalogs.drugs.clone(), catalogs.interactions.clone())
    }

    pub fn with_rules(mut self, rules: RuleEngine) -> Self {
        self.rules = rules;
        self
    }

    /// Display name; unknown ids are reviewed by the id text itself.
    fn name_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.drugs.get(id).map(|d| d.name.as_str()).unwrap_or(id)
    }

    fn review_each<F>(&self, medicines: &[DrugId], mut fails: F) -> Review
    where
        F: FnMut(&str, Option<&DrugInfo>) -> bool,
    {
        let failing = medicines
            .iter()
            .filter(|id| fails(self.name_of(id), self.drugs.get(id.as_str())))
            .cloned()
            .collect();
        Review::from_failing(failing)
    }

    fn violates(&self, name: &str, person: &Demographics, age_family: bool) -> bool {
        self.rules
            .medicine_violations(name, person)
            .iter()
            .any(|r| (r.family == RuleFamily::AgeBand) == age_family)
    }
}

impl KnowledgeBase for InMemoryKnowledgeBase {
    fn age_review(&self, medicines: &[DrugId], person: &Demographics) -> KnowledgeResult<Review> {
        let band = person.age_band_tag();
        Ok(self.review_each(medicines, |name, info| {
            let forbidden = match (band, info) {
                (Some(tag), Some(drug)) => drug.is_forbidden_for(tag.label()),
                _ => false,
            };
            forbidden || self.violates(name, person, true)
        }))
    }

    fn special_population_review(
        &self,
        medicines: &[DrugId],
        person: &Demographics,
    ) -> KnowledgeResult<Review> {
        Ok(self.review_each(medicines, |name, info| {
            let forbidden = info.map_or(false, |drug| {
                person
                    .group
                    .iter()
                    .filter(|t| !t.is_age_band())
                    .any(|t| drug.is_forbidden_for(t.label()))
            });
            forbidden || self.violates(name, person, false)
        }))
    }

    fn allergy_review(&self, medicines: &[DrugId], allergens: &[String]) -> KnowledgeResult<Review> {
        let allergens: Vec<&str> = allergens
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .collect();
        if allergens.is_empty() {
            return Ok(Review::pass());
        }
        Ok(self.review_each(medicines, |name, info| {
            allergens.iter().any(|allergen| {
                name.contains(allergen)
                    || info.map_or(false, |drug| {
                        drug.ingredients
                            .iter()
                            .any(|i| !i.is_empty() && (i.contains(allergen) || allergen.contains(i.as_str())))
                    })
            })
        }))
    }

    fn interaction_check(&self, a: &str, b: &str) -> KnowledgeResult<bool> {
        Ok(self.interactions.interacts(a, b))
    }

    fn drug_detail(&self, id: &str) -> Option<DrugInfo> {
        self.drugs.get(id).cloned()
    }
}
