//! End-to-end generation tests against a mock oracle and in-memory knowledge base.

use std::collections::{BTreeMap, HashMap};

use drugrec_core::models::{
    AgeBand, AgeDistribution, CandidateDrug, Caution, CautionLevel, Catalogs, DiagnosisCatalog,
    DrugInfo, Gender, GroupTag, InteractionGraph,
};
use drugrec_core::{
    Database, GenerationConfig, GenerationContext, Generator, InMemoryKnowledgeBase, PatientRecord,
    PopulationExport, UNKNOWN_DIAGNOSIS,
};
use drugrec_llm::MockOracle;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn candidate(id: &str, name: &str) -> CandidateDrug {
    CandidateDrug {
        drug_id: Some(id.to_string()),
        name: name.to_string(),
    }
}

fn drug(id: &str, name: &str, treats: &[&str], ingredients: &[&str], forbidden: &[&str]) -> DrugInfo {
    let mut info = DrugInfo::new(id, name);
    info.treats = treats.iter().map(|s| s.to_string()).collect();
    info.ingredients = ingredients.iter().map(|s| s.to_string()).collect();
    info.cautions = forbidden
        .iter()
        .map(|crowd| Caution {
            crowd: crowd.to_string(),
            level: CautionLevel::Forbidden,
        })
        .collect();
    info
}

/// A small catalog covering age-restricted, gender-restricted and
/// allergen-bearing medicines.
fn catalogs() -> Catalogs {
    let mut entries = BTreeMap::new();
    entries.insert(
        "感冒".to_string(),
        vec![candidate("1", "对乙酰氨基酚片"), candidate("2", "小儿感冒颗粒")],
    );
    entries.insert(
        "肺炎".to_string(),
        vec![candidate("3", "阿莫西林胶囊"), candidate("4", "左氧氟沙星片")],
    );
    entries.insert("小儿腹泻".to_string(), vec![candidate("5", "蒙脱石散")]);
    entries.insert("前列腺炎".to_string(), vec![candidate("6", "前列康片")]);
    entries.insert("高血压".to_string(), vec![candidate("7", "氨氯地平片"), candidate("8", "硝苯地平片")]);

    let drugs = vec![
        drug("1", "对乙酰氨基酚片", &["感冒", "发热"], &["对乙酰氨基酚"], &[]),
        drug("2", "小儿感冒颗粒", &["感冒"], &[], &[]),
        drug("3", "阿莫西林胶囊", &["肺炎"], &["阿莫西林", "青霉素"], &[]),
        drug("4", "左氧氟沙星片", &["肺炎"], &["左氧氟沙星"], &["儿童", "青少年", "孕妇"]),
        drug("5", "蒙脱石散", &["腹泻"], &["蒙脱石"], &[]),
        drug("6", "前列康片", &["前列腺炎"], &[], &[]),
        drug("7", "氨氯地平片", &["高血压"], &[], &[]),
        drug("8", "硝苯地平片", &["高血压"], &[], &["孕妇"]),
        drug("9", "华法林钠片", &["心房颤动"], &["华法林"], &[]),
    ];

    let mut interactions = InteractionGraph::default();
    interactions.add_interaction("1", "9");
    interactions.add_interaction("7", "9");

    Catalogs {
        age_distribution: AgeDistribution::new(vec![
            AgeBand { start: 0, end: 12, probability: 0.2 },
            AgeBand { start: 12, end: 18, probability: 0.1 },
            AgeBand { start: 18, end: 65, probability: 0.5 },
            AgeBand { start: 65, end: 90, probability: 0.2 },
        ])
        .unwrap(),
        allergens: vec!["青霉素".to_string(), "磺胺".to_string()],
        diagnoses: DiagnosisCatalog::new(entries),
        interactions,
        drugs: drugs.into_iter().map(|d| (d.id.clone(), d)).collect(),
    }
}

fn config(seed: u64) -> GenerationConfig {
    GenerationConfig {
        enforce_quota: false,
        history_probability: 0.5,
        allergen_probability: 0.5,
        checkpoint_interval: 0,
        seed: Some(seed),
        ..GenerationConfig::default()
    }
}

fn names(catalogs: &Catalogs) -> HashMap<String, String> {
    catalogs.drugs.values().map(|d| (d.id.clone(), d.name.clone())).collect()
}

fn assert_record_invariants(record: &PatientRecord, catalogs: &Catalogs) {
    let names = names(catalogs);

    assert!(record.has_consistent_age_band(), "record {} age band", record.id);
    assert!(record.medicine_disjoint_from_on_medicine(), "record {} overlap", record.id);
    assert_ne!(record.diagnosis, UNKNOWN_DIAGNOSIS);
    assert!(!record.symptom.is_empty());

    if record.age >= 12 {
        assert!(!record.diagnosis.contains("小儿"), "record {}: {}", record.id, record.diagnosis);
        assert!(!record.medicine.contains(&"2".to_string()));
    }
    if record.gender == Gender::Female {
        assert_ne!(record.diagnosis, "前列腺炎");
    }
    if record.age < 18 {
        assert!(!record.medicine.contains(&"4".to_string()));
    }
    if record.group.contains(&GroupTag::Pregnant) {
        assert!(!record.medicine.contains(&"8".to_string()));
    }
    if record.allergen.iter().any(|a| a == "青霉素") {
        assert!(!record.medicine.contains(&"3".to_string()));
    }
    for id in &record.medicine {
        assert!(names.contains_key(id), "unknown medicine id {}", id);
    }
}

#[test]
fn test_generated_population_respects_invariants() {
    let catalogs = catalogs();
    let kb = InMemoryKnowledgeBase::from_catalogs(&catalogs);
    let oracle = MockOracle::default();
    let config = config(7);
    let generator = Generator::new(&catalogs, &oracle, &kb, &config);
    let mut ctx = GenerationContext::new();

    let report = generator
        .generate(&mut ctx, 40, &mut StdRng::seed_from_u64(7))
        .unwrap();

    assert_eq!(report.generated, 40);
    assert!(!report.stopped_early);
    assert_eq!(ctx.population.len(), 40);
    for record in &ctx.population {
        assert_record_invariants(record, &catalogs);
    }
    assert_eq!(ctx.usage.total(), 40);
}

#[test]
fn test_history_never_shares_medicine_with_gold_set() {
    let catalogs = catalogs();
    let kb = InMemoryKnowledgeBase::from_catalogs(&catalogs);
    let oracle = MockOracle::default();
    let config = GenerationConfig {
        history_probability: 1.0,
        ..config(11)
    };
    let generator = Generator::new(&catalogs, &oracle, &kb, &config);
    let mut ctx = GenerationContext::new();

    generator
        .generate(&mut ctx, 30, &mut StdRng::seed_from_u64(11))
        .unwrap();

    for record in &ctx.population {
        assert!(!record.medicine.is_empty());
        assert!(record.medicine_disjoint_from_on_medicine());
        // Warfarin interacts with both 1 and 7; whenever it is concurrent,
        // neither may remain in the gold set.
        if record.on_medicine.contains(&"9".to_string()) {
            assert!(!record.medicine.contains(&"1".to_string()));
            assert!(!record.medicine.contains(&"7".to_string()));
        }
    }
}

#[test]
fn test_run_resumes_with_continuous_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("population.db");
    let catalogs = catalogs();
    let kb = InMemoryKnowledgeBase::from_catalogs(&catalogs);
    let oracle = MockOracle::default();

    let fresh = GenerationConfig { resume: false, ..config(3) };
    let first_usage = {
        let mut db = Database::open(&path).unwrap();
        let (ctx, report) = Generator::new(&catalogs, &oracle, &kb, &fresh)
            .run(&mut db, 3)
            .unwrap();
        assert_eq!(report.generated, 3);
        assert_eq!(ctx.population.len(), 3);
        ctx.usage
    };

    let resumed = GenerationConfig { resume: true, ..config(4) };
    let mut db = Database::open(&path).unwrap();
    let (ctx, report) = Generator::new(&catalogs, &oracle, &kb, &resumed)
        .run(&mut db, 2)
        .unwrap();
    assert_eq!(report.generated, 2);

    let ids: Vec<u64> = ctx.population.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    assert_eq!(db.count_patients().unwrap(), 5);
    let usage = db.load_usage().unwrap();
    assert_eq!(usage.total(), 5);
    for diagnosis in catalogs.diagnoses.diagnoses() {
        let added = ctx.population[3..]
            .iter()
            .filter(|r| r.diagnosis == diagnosis)
            .count() as u32;
        assert_eq!(
            usage.count(diagnosis),
            first_usage.count(diagnosis) + added,
            "usage of {}",
            diagnosis
        );
        assert_eq!(ctx.usage.count(diagnosis), usage.count(diagnosis));
    }
    assert!(!db.load_cache().unwrap().is_empty());
    assert_eq!(db.list_runs().unwrap().len(), 2);
}

#[test]
fn test_fresh_run_discards_previous_population() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("population.db");
    let catalogs = catalogs();
    let kb = InMemoryKnowledgeBase::from_catalogs(&catalogs);
    let oracle = MockOracle::default();
    let fresh = GenerationConfig { resume: false, ..config(5) };

    let mut db = Database::open(&path).unwrap();
    let generator = Generator::new(&catalogs, &oracle, &kb, &fresh);
    generator.run(&mut db, 4).unwrap();
    let (ctx, _) = generator.run(&mut db, 2).unwrap();

    assert_eq!(ctx.population.len(), 2);
    assert_eq!(db.count_patients().unwrap(), 2);
}

#[test]
fn test_export_of_generated_population() {
    let catalogs = catalogs();
    let kb = InMemoryKnowledgeBase::from_catalogs(&catalogs);
    let oracle = MockOracle::default();
    let config = config(9);
    let generator = Generator::new(&catalogs, &oracle, &kb, &config);
    let mut ctx = GenerationContext::new();
    generator
        .generate(&mut ctx, 5, &mut StdRng::seed_from_u64(9))
        .unwrap();

    let export = PopulationExport::with_names(&ctx.population, &kb);
    assert_eq!(export.total_records, 5);
    assert!(export
        .records
        .iter()
        .all(|r| r.medicine.iter().all(|d| d.name.is_some())));
    assert_eq!(export.to_csv().lines().count(), 6);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_quota_never_exceeded(seed in any::<u64>(), quota in 1u32..4, count in 1usize..30) {
        let catalogs = catalogs();
        let kb = InMemoryKnowledgeBase::from_catalogs(&catalogs);
        let oracle = MockOracle::default();
        let config = GenerationConfig {
            enforce_quota: true,
            diagnosis_quota: quota,
            ..config(seed)
        };
        let generator = Generator::new(&catalogs, &oracle, &kb, &config);
        let mut ctx = GenerationContext::new();

        let report = generator
            .generate(&mut ctx, count, &mut StdRng::seed_from_u64(seed))
            .unwrap();

        prop_assert!(report.generated <= count);
        prop_assert!(report.generated <= quota as usize * catalogs.diagnoses.len());
        for (_, n) in ctx.usage.iter() {
            prop_assert!(n <= quota);
        }
        for record in &ctx.population {
            prop_assert_eq!(ctx.usage.count(&record.diagnosis) as usize,
                ctx.population.iter().filter(|r| r.diagnosis == record.diagnosis).count());
        }
    }
}
