//! Demographic sampling.

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::GenerationConfig;
use crate::models::{AgeDistribution, CatalogError, CatalogResult, Demographics, Gender, GroupTag};

/// Draws the demographic part of a record.
pub struct DemographicSampler<'a> {
    distribution: &'a AgeDistribution,
    weights: WeightedIndex<f64>,
    allergens: &'a [String],
    hepatic_probability: f64,
    renal_probability: f64,
    allergen_probability: f64,
}

impl<'a> DemographicSampler<'a> {
    pub fn new(
        distribution: &'a AgeDistribution,
        allergens: &'a [String],
        config: &GenerationConfig,
    ) -> CatalogResult<Self> {
        let weights = WeightedIndex::new(distribution.bands().iter().map(|b| b.probability))
            .map_err(|e| CatalogError::Invalid(format!("age distribution weights: {}", e)))?;
        Ok(Self {
            distribution,
            weights,
            allergens,
            hepatic_probability: config.hepatic_probability,
            renal_probability: config.renal_probability,
            allergen_probability: config.allergen_probability,
        })
    }

    /// Weighted band choice, then a uniform age inside the half-open band.
    pub fn sample_age<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        let band = &self.distribution.bands()[self.weights.sample(rng)];
        rng.gen_range(band.start..band.end)
    }

    pub fn sample_gender<R: Rng + ?Sized>(&self, rng: &mut R) -> Gender {
        if rng.gen::<bool>() {
            Gender::Female
        } else {
            Gender::Male
        }
    }

    /// Age-band tag, then independent hepatic and renal trials.
    pub fn decide_group<R: Rng + ?Sized>(&self, age: u32, rng: &mut R) -> Vec<GroupTag> {
        let mut group = vec![GroupTag::age_band(age)];
        if rng.gen::<f64>() < self.hepatic_probability {
            group.push(GroupTag::HepaticImpairment);
        }
        if rng.gen::<f64>() < self.renal_probability {
            group.push(GroupTag::RenalImpairment);
        }
        group
    }

    /// At most one allergen, chosen uniformly.
    pub fn sample_allergen<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<String> {
        if rng.gen::<f64>() >= self.allergen_probability {
            return Vec::new();
        }
        self.allergens.choose(rng).cloned().into_iter().collect()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Demographics {
        let age = self.sample_age(rng);
        let gender = self.sample_gender(rng);
        let group = self.decide_group(age, rng);
        let allergen = self.sample_allergen(rng);
        Demographics {
            age,
            gender,
            group,
            allergen,
        }
    }
}
