//! Keyword plausibility rules for diagnosis and medicine names.
//!
//! A table is an ordered list of rules, each tagged with a family. Within a
//! family only the first rule whose keywords occur in the text is applied,
//! so overlapping keyword sets resolve by table order. A name is plausible
//! when no applied rule rejects the person.

use crate::models::Demographics;

/// Rule families. One rule per family is applied at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleFamily {
    AgeBand,
    Gender,
    SpecialPopulation,
    Hormone,
}

/// A single keyword rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub family: RuleFamily,
    pub category: &'static str,
    pub keywords: &'static [&'static str],
    pub accepts: fn(&Demographics) -> bool,
}

impl Rule {
    pub fn matches(&self, text: &str) -> bool {
        self.keywords.iter().any(|k| text.contains(k))
    }
}

/// Ordered, first-match-wins rule table.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Append a rule; it only applies if no earlier rule of its family matches.
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First applied rule that rejects the person, if any.
    pub fn violation(&self, text: &str, person: &Demographics) -> Option<&Rule> {
        self.violations(text, person).into_iter().next()
    }

    /// Every applied rule that rejects the person, at most one per family.
    pub fn violations(&self, text: &str, person: &Demographics) -> Vec<&Rule> {
        let mut applied: Vec<RuleFamily> = Vec::with_capacity(4);
        let mut failed = Vec::new();
        for rule in &self.rules {
            if applied.contains(&rule.family) || !rule.matches(text) {
                continue;
            }
            applied.push(rule.family);
            if !(rule.accepts)(person) {
                failed.push(rule);
            }
        }
        failed
    }

    pub fn is_plausible(&self, text: &str, person: &Demographics) -> bool {
        self.violation(text, person).is_none()
    }
}

const CHILD_WORDS: &[&str] = &["小儿", "儿童", "婴儿", "新生儿", "幼儿", "婴幼儿", "小孩"];
const CHILD_DIAGNOSIS_WORDS: &[&str] =
    &["小儿", "儿童", "婴儿", "新生儿", "幼儿", "婴幼儿", "小孩", "先天性"];
const ADULT_WORDS: &[&str] = &["成人"];
const ELDERLY_DIAGNOSIS_WORDS: &[&str] = &["老年", "老人", "退行性", "老年性"];
const ELDERLY_MEDICINE_WORDS: &[&str] = &["老年", "老人"];

const FEMALE_DIAGNOSIS_WORDS: &[&str] = &[
    "妇", "妇女", "女性", "孕妇", "妊娠", "哺乳期", "产妇", "经期", "月经", "更年期", "子宫",
    "卵巢", "宫颈", "阴道", "乳腺", "盆腔", "妇科", "产科", "绝经", "宫内膜", "附件", "外阴",
    "白带", "痛经", "闭经",
];
const MALE_DIAGNOSIS_WORDS: &[&str] = &[
    "前列腺", "男性", "阳痿", "早泄", "遗精", "男科", "睾丸", "附睾", "精囊", "阴囊", "包皮",
    "龟头", "尿道", "精索",
];
const FEMALE_MEDICINE_WORDS: &[&str] = &[
    "妇", "妇女", "女性", "孕妇", "妊娠", "哺乳期", "授乳", "产妇", "经期", "月经", "更年期",
];
const MALE_MEDICINE_WORDS: &[&str] =
    &["壮阳", "前列腺", "男性", "阳痿", "早泄", "遗精", "补肾壮阳", "男科"];

const PREGNANCY_DIAGNOSIS_WORDS: &[&str] =
    &["孕妇", "妊娠", "孕期", "胎儿", "安胎", "流产", "早产", "产前", "产后"];
const PREGNANCY_MEDICINE_WORDS: &[&str] = &["孕妇", "妊娠", "孕期", "胎儿", "安胎"];
const LACTATION_WORDS: &[&str] = &["哺乳期", "授乳", "催乳", "回奶"];

const CONTRACEPTION_WORDS: &[&str] = &["避孕", "紧急避孕"];
const ESTROGEN_WORDS: &[&str] = &["雌激素", "雌二醇", "黄体酮"];
const ANDROGEN_WORDS: &[&str] = &["睾酮", "雄激素"];

fn is_child(p: &Demographics) -> bool {
    p.age < 12
}

fn is_of_age(p: &Demographics) -> bool {
    p.age >= 18
}

fn is_over_fifty(p: &Demographics) -> bool {
    p.age >= 50
}

fn is_senior(p: &Demographics) -> bool {
    p.age >= 65
}

fn is_female(p: &Demographics) -> bool {
    p.is_female()
}

fn is_male(p: &Demographics) -> bool {
    !p.is_female()
}

fn can_be_pregnant(p: &Demographics) -> bool {
    p.is_female() && (15..=45).contains(&p.age)
}

fn can_be_lactating(p: &Demographics) -> bool {
    p.is_female() && (18..=40).contains(&p.age)
}

fn can_use_contraception(p: &Demographics) -> bool {
    p.is_female() && (15..=50).contains(&p.age)
}

/// Rules applied to diagnosis names.
pub fn diagnosis_rules() -> RuleTable {
    use RuleFamily::*;
    RuleTable::new(vec![
        Rule { family: AgeBand, category: "pediatric", keywords: CHILD_DIAGNOSIS_WORDS, accepts: is_child },
        Rule { family: AgeBand, category: "adult", keywords: ADULT_WORDS, accepts: is_of_age },
        Rule { family: AgeBand, category: "geriatric", keywords: ELDERLY_DIAGNOSIS_WORDS, accepts: is_over_fifty },
        Rule { family: Gender, category: "female-only", keywords: FEMALE_DIAGNOSIS_WORDS, accepts: is_female },
        Rule { family: Gender, category: "male-only", keywords: MALE_DIAGNOSIS_WORDS, accepts: is_male },
        Rule { family: SpecialPopulation, category: "pregnancy", keywords: PREGNANCY_DIAGNOSIS_WORDS, accepts: can_be_pregnant },
        Rule { family: SpecialPopulation, category: "lactation", keywords: LACTATION_WORDS, accepts: can_be_lactating },
    ])
}

/// Rules applied to medicine names.
pub fn medicine_rules() -> RuleTable {
    use RuleFamily::*;
    RuleTable::new(vec![
        Rule { family: AgeBand, category: "pediatric", keywords: CHILD_WORDS, accepts: is_child },
        Rule { family: AgeBand, category: "adult", keywords: ADULT_WORDS, accepts: is_of_age },
        Rule { family: AgeBand, category: "geriatric", keywords: ELDERLY_MEDICINE_WORDS, accepts: is_senior },
        Rule { family: Gender, category: "female-only", keywords: FEMALE_MEDICINE_WORDS, accepts: is_female },
        Rule { family: Gender, category: "male-only", keywords: MALE_MEDICINE_WORDS, accepts: is_male },
        Rule { family: SpecialPopulation, category: "pregnancy", keywords: PREGNANCY_MEDICINE_WORDS, accepts: can_be_pregnant },
        Rule { family: SpecialPopulation, category: "lactation", keywords: LACTATION_WORDS, accepts: can_be_lactating },
        Rule { family: Hormone, category: "contraception", keywords: CONTRACEPTION_WORDS, accepts: can_use_contraception },
        Rule { family: Hormone, category: "estrogen", keywords: ESTROGEN_WORDS, accepts: is_female },
        Rule { family: Hormone, category: "androgen", keywords: ANDROGEN_WORDS, accepts: is_male },
    ])
}

/// Plausibility checks for diagnosis and medicine names.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    diagnosis: RuleTable,
    medicine: RuleTable,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            diagnosis: diagnosis_rules(),
            medicine: medicine_rules(),
        }
    }

    pub fn with_tables(diagnosis: RuleTable, medicine: RuleTable) -> Self {
        Self { diagnosis, medicine }
    }

    pub fn is_diagnosis_plausible(&self, diagnosis: &str, person: &Demographics) -> bool {
        self.diagnosis.is_plausible(diagnosis, person)
    }

    pub fn is_medicine_plausible(&self, medicine: &str, person: &Demographics) -> bool {
        self.medicine.is_plausible(medicine, person)
    }

    pub fn diagnosis_violation(&self, diagnosis: &str, person: &Demographics) -> Option<&Rule> {
        self.diagnosis.violation(diagnosis, person)
    }

    pub fn medicine_violation(&self, medicine: &str, person: &Demographics) -> Option<&Rule> {
        self.medicine.violation(medicine, person)
    }

    pub fn medicine_violations(&self, medicine: &str, person: &Demographics) -> Vec<&Rule> {
        self.medicine.violations(medicine, person)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, GroupTag};

    fn person(age: u32, gender: Gender) -> Demographics {
        Demographics {
            age,
            gender,
            group: vec![GroupTag::age_band(age)],
            allergen: vec![],
        }
    }

    #[test]
    fn test_no_rule_fires_is_plausible() {
        let engine = RuleEngine::new();
        assert!(engine.is_diagnosis_plausible("高血压", &person(40, Gender::Male)));
        assert!(engine.is_medicine_plausible("阿莫西林胶囊", &person(3, Gender::Female)));
    }

    #[test]
    fn test_pediatric_diagnosis() {
        let engine = RuleEngine::new();
        assert!(engine.is_diagnosis_plausible("小儿肺炎", &person(11, Gender::Male)));
        assert!(!engine.is_diagnosis_plausible("小儿肺炎", &person(12, Gender::Male)));
        assert!(!engine.is_diagnosis_plausible("先天性心脏病", &person(30, Gender::Male)));
    }

    #[test]
    fn test_geriatric_threshold_differs_by_table() {
        let engine = RuleEngine::new();
        let p = person(55, Gender::Male);
        assert!(engine.is_diagnosis_plausible("老年性白内障", &p));
        assert!(!engine.is_medicine_plausible("老年维生素片", &p));
    }

    #[test]
    fn test_age_family_first_match_wins() {
        // "小儿" matches first, so the adult rule is never consulted.
        let engine = RuleEngine::new();
        assert!(engine.is_diagnosis_plausible("小儿成人型糖尿病", &person(8, Gender::Female)));
    }

    #[test]
    fn test_gender_rules() {
        let engine = RuleEngine::new();
        assert!(!engine.is_diagnosis_plausible("前列腺炎", &person(40, Gender::Female)));
        assert!(engine.is_diagnosis_plausible("前列腺炎", &person(40, Gender::Male)));
        assert!(!engine.is_diagnosis_plausible("卵巢囊肿", &person(40, Gender::Male)));
    }

    #[test]
    fn test_pregnancy_window() {
        let engine = RuleEngine::new();
        assert!(engine.is_diagnosis_plausible("妊娠高血压", &person(30, Gender::Female)));
        assert!(!engine.is_diagnosis_plausible("妊娠高血压", &person(50, Gender::Female)));
        assert!(!engine.is_diagnosis_plausible("产后抑郁", &person(14, Gender::Female)));
    }

    #[test]
    fn test_hormone_rules() {
        let engine = RuleEngine::new();
        assert!(!engine.is_medicine_plausible("左炔诺孕酮(紧急避孕)", &person(55, Gender::Female)));
        assert!(engine.is_medicine_plausible("左炔诺孕酮(紧急避孕)", &person(25, Gender::Female)));
        assert!(!engine.is_medicine_plausible("十一酸睾酮软胶囊", &person(25, Gender::Female)));
        assert!(!engine.is_medicine_plausible("戊酸雌二醇片", &person(25, Gender::Male)));
    }

    #[test]
    fn test_violation_reports_category() {
        let engine = RuleEngine::new();
        let elderly_man = person(70, Gender::Male);
        let rule = engine.medicine_violation("孕妇专用药", &elderly_man).unwrap();
        assert_eq!(rule.category, "female-only");
        let rule = engine.medicine_violation("儿童退热药", &elderly_man).unwrap();
        assert_eq!(rule.category, "pediatric");
    }

    #[test]
    fn test_violations_one_per_family() {
        let engine = RuleEngine::new();
        let boy = person(8, Gender::Male);
        let failed = engine.medicine_violations("成人孕妇维生素", &boy);
        let families: Vec<RuleFamily> = failed.iter().map(|r| r.family).collect();
        assert_eq!(
            families,
            vec![RuleFamily::AgeBand, RuleFamily::Gender, RuleFamily::SpecialPopulation]
        );
    }

    #[test]
    fn test_tables_are_extensible() {
        let mut table = RuleTable::default();
        table.push(Rule {
            family: RuleFamily::AgeBand,
            category: "teen",
            keywords: &["青春期"],
            accepts: |p| (10..20).contains(&p.age),
        });
        let engine = RuleEngine::with_tables(table, medicine_rules());
        assert!(!engine.is_diagnosis_plausible("青春期痤疮", &person(40, Gender::Male)));
        assert!(engine.is_diagnosis_plausible("青春期痤疮", &person(15, Gender::Male)));
    }
}
