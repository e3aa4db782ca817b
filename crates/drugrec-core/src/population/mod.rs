//! Population controller.
//!
//! Drives sampling → diagnosis/symptom → medicine → comorbidity for each
//! candidate record, enforces the per-diagnosis quota, and hands the growing
//! context to a checkpoint sink.

mod context;

pub use context::*;

use drugrec_llm::CompletionOracle;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::CachedCompletion;
use crate::config::GenerationConfig;
use crate::db::{Database, DbResult};
use crate::knowledge::KnowledgeBase;
use crate::models::{Catalogs, PatientRecord};
use crate::resolver::{ComorbidityInjector, MedicineResolver, SymptomResolver};
use crate::rules::RuleEngine;
use crate::sampler::DemographicSampler;
use crate::SynthResult;

/// Summary of one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub requested: usize,
    pub generated: usize,
    /// Complete records dropped because their diagnosis was at quota
    pub discarded_by_quota: usize,
    /// Candidates whose medicine resolution returned the unknown sentinel
    pub discarded_unknown: usize,
    /// Records accepted with an unaudited symptom pair
    pub degraded: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub checkpoints: usize,
    pub stopped_early: bool,
}

impl GenerationReport {
    fn start(requested: usize) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
            requested,
            generated: 0,
            discarded_by_quota: 0,
            discarded_unknown: 0,
            degraded: 0,
            cache_hits: 0,
            cache_misses: 0,
            checkpoints: 0,
            stopped_early: false,
        }
    }

    pub fn discarded(&self) -> usize {
        self.discarded_by_quota + self.discarded_unknown
    }
}

/// Per-run resolver stack borrowed from the generator.
struct Pipeline<'p, K: ?Sized> {
    sampler: DemographicSampler<'p>,
    medicine: MedicineResolver<'p, K>,
    injector: ComorbidityInjector<'p, K>,
    history_probability: f64,
}

/// Generates records into a [`GenerationContext`].
pub struct Generator<'a, O: ?Sized, K: ?Sized> {
    catalogs: &'a Catalogs,
    oracle: &'a O,
    knowledge: &'a K,
    config: &'a GenerationConfig,
    rules: RuleEngine,
}

impl<'a, O, K> Generator<'a, O, K>
where
    O: CompletionOracle + ?Sized,
    K: KnowledgeBase + ?Sized,
{
    pub fn new(
        catalogs: &'a Catalogs,
        oracle: &'a O,
        knowledge: &'a K,
        config: &'a GenerationConfig,
    ) -> Self {
        Self {
            catalogs,
            oracle,
            knowledge,
            config,
            rules: RuleEngine::new(),
        }
    }

    pub fn with_rules(mut self, rules: RuleEngine) -> Self {
        self.rules = rules;
        self
    }

    fn pipeline(&self) -> SynthResult<Pipeline<'_, K>> {
        let sampler = DemographicSampler::new(
            &self.catalogs.age_distribution,
            &self.catalogs.allergens,
            self.config,
        )?;
        let symptoms = SymptomResolver::new(
            &self.catalogs.diagnoses,
            &self.rules,
            SymptomResolver::policy_for(
                self.config.symptom_max_attempts,
                self.config.accept_unaudited_on_exhaustion,
            ),
        );
        Ok(Pipeline {
            sampler,
            medicine: MedicineResolver::new(
                &self.catalogs.diagnoses,
                self.knowledge,
                symptoms,
                self.config.medicine_max_attempts,
            ),
            injector: ComorbidityInjector::new(self.catalogs, self.knowledge),
            history_probability: self.config.history_probability,
        })
    }

    /// Generate `count` records without intermediate persistence.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        ctx: &mut GenerationContext,
        count: usize,
        rng: &mut R,
    ) -> SynthResult<GenerationReport> {
        self.generate_with_checkpoints(ctx, count, rng, |_| Ok(()))
    }

    /// Generate `count` records, calling `checkpoint` every
    /// `checkpoint_interval` accepted records.
    pub fn generate_with_checkpoints<R, F>(
        &self,
        ctx: &mut GenerationContext,
        count: usize,
        rng: &mut R,
        mut checkpoint: F,
    ) -> SynthResult<GenerationReport>
    where
        R: Rng + ?Sized,
        F: FnMut(&GenerationContext) -> DbResult<()>,
    {
        let pipeline = self.pipeline()?;
        let mut report = GenerationReport::start(count);
        let (hits_before, misses_before) = (ctx.cache.hits(), ctx.cache.misses());
        let mut next_id = ctx.next_id();
        let mut consecutive_rejections = 0usize;

        info!(
            run_id = %report.run_id,
            requested = count,
            existing = ctx.population.len(),
            "generation started"
        );

        while report.generated < count {
            if self.config.enforce_quota
                && ctx
                    .usage
                    .all_reached(self.catalogs.diagnoses.diagnoses(), self.config.diagnosis_quota)
            {
                warn!(generated = report.generated, "every diagnosis is at quota, stopping");
                report.stopped_early = true;
                break;
            }
            if consecutive_rejections >= self.config.max_consecutive_rejections {
                warn!(consecutive_rejections, "too many rejected candidates in a row, stopping");
                report.stopped_early = true;
                break;
            }

            let Some((record, degraded)) = self.build_record(&pipeline, next_id, ctx, rng) else {
                report.discarded_unknown += 1;
                consecutive_rejections += 1;
                continue;
            };

            if self.config.enforce_quota
                && ctx.usage.has_reached(&record.diagnosis, self.config.diagnosis_quota)
            {
                debug!(record_id = record.id, diagnosis = %record.diagnosis, "diagnosis at quota, discarding");
                report.discarded_by_quota += 1;
                consecutive_rejections += 1;
                continue;
            }

            debug!(record_id = record.id, diagnosis = %record.diagnosis, "record accepted");
            ctx.commit(record);
            next_id += 1;
            report.generated += 1;
            consecutive_rejections = 0;
            if degraded {
                report.degraded += 1;
            }

            let interval = self.config.checkpoint_interval;
            if interval > 0 && report.generated % interval == 0 {
                checkpoint(&*ctx)?;
                report.checkpoints += 1;
                info!(generated = report.generated, total = ctx.population.len(), "checkpoint written");
            }
        }

        report.cache_hits = ctx.cache.hits() - hits_before;
        report.cache_misses = ctx.cache.misses() - misses_before;
        report.finished_at = Some(chrono::Utc::now().to_rfc3339());
        info!(
            run_id = %report.run_id,
            generated = report.generated,
            discarded = report.discarded(),
            degraded = report.degraded,
            cache_hits = report.cache_hits,
            cache_misses = report.cache_misses,
            "generation finished"
        );
        Ok(report)
    }

    /// Assemble one candidate record. `None` when medicine resolution
    /// soft-failed; the bool flags an unaudited symptom pair.
    fn build_record<R: Rng + ?Sized>(
        &self,
        pipeline: &Pipeline<'_, K>,
        id: u64,
        ctx: &mut GenerationContext,
        rng: &mut R,
    ) -> Option<(PatientRecord, bool)> {
        let person = pipeline.sampler.sample(rng);
        let mut calls = CachedCompletion::new(self.oracle, &mut ctx.cache);

        let resolved = pipeline.medicine.resolve(&person, &mut calls, rng);
        if resolved.is_unknown() {
            debug!(record_id = id, age = person.age, "medicine resolution failed, discarding");
            return None;
        }

        let mut record = PatientRecord {
            id,
            age: person.age,
            gender: person.gender,
            group: person.group,
            diagnosis: resolved.diagnosis,
            symptom: resolved.symptom,
            allergen: person.allergen,
            medicine: resolved.medicine,
            antecedents: Vec::new(),
            on_medicine: Vec::new(),
        };

        if rng.gen::<f64>() < pipeline.history_probability {
            let injected = pipeline.injector.inject(&mut record, &mut calls, rng);
            if !injected.removed.is_empty() {
                debug!(record_id = id, removed = injected.removed.len(), "gold medicines removed by interaction");
            }
        }

        Some((record, resolved.degraded))
    }

    /// Load or reset the store, generate, and persist every artifact.
    pub fn run(
        &self,
        db: &mut Database,
        count: usize,
    ) -> SynthResult<(GenerationContext, GenerationReport)> {
        let mut ctx = if self.config.resume {
            let ctx = db.load_context()?;
            info!(records = ctx.population.len(), cached = ctx.cache.len(), "resuming");
            ctx
        } else {
            db.reset()?;
            GenerationContext::new()
        };

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let report = self.generate_with_checkpoints(&mut ctx, count, &mut rng, |c| db.save_context(c))?;
        db.save_context(&ctx)?;
        db.record_run(&report, self.config)?;
        Ok((ctx, report))
    }
}
