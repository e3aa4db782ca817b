//! Patient models.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Medicine identifier as used by the knowledge base.
pub type DrugId = String;

/// Patient gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Label used in oracle prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Gender::Male => "男",
            Gender::Female => "女",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "男" | "male" => Some(Gender::Male),
            "女" | "female" => Some(Gender::Female),
            _ => None,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Demographic tag. Age-band tags are mutually exclusive; the rest are additive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupTag {
    Child,
    Adolescent,
    Adult,
    Elderly,
    Pregnant,
    Lactating,
    HepaticImpairment,
    RenalImpairment,
}

impl GroupTag {
    pub const ALL: [GroupTag; 8] = [
        GroupTag::Child,
        GroupTag::Adolescent,
        GroupTag::Adult,
        GroupTag::Elderly,
        GroupTag::Pregnant,
        GroupTag::Lactating,
        GroupTag::HepaticImpairment,
        GroupTag::RenalImpairment,
    ];

    /// Label used in oracle prompts and knowledge-base cautions.
    pub fn label(&self) -> &'static str {
        match self {
            GroupTag::Child => "儿童",
            GroupTag::Adolescent => "青少年",
            GroupTag::Adult => "成人",
            GroupTag::Elderly => "老年人",
            GroupTag::Pregnant => "孕妇",
            GroupTag::Lactating => "哺乳期",
            GroupTag::HepaticImpairment => "肝功能不全",
            GroupTag::RenalImpairment => "肾功能不全",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == label.trim())
    }

    pub fn is_age_band(&self) -> bool {
        matches!(
            self,
            GroupTag::Child | GroupTag::Adolescent | GroupTag::Adult | GroupTag::Elderly
        )
    }

    /// Age band for an age: [0,12) child, [12,18) adolescent, [18,65) adult, [65,∞) elderly.
    pub fn age_band(age: u32) -> Self {
        match age {
            0..=11 => GroupTag::Child,
            12..=17 => GroupTag::Adolescent,
            18..=64 => GroupTag::Adult,
            _ => GroupTag::Elderly,
        }
    }
}

/// The sampled person a record is built around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    pub age: u32,
    pub gender: Gender,
    pub group: Vec<GroupTag>,
    pub allergen: Vec<String>,
}

impl Demographics {
    pub fn has(&self, tag: GroupTag) -> bool {
        self.group.contains(&tag)
    }

    pub fn is_female(&self) -> bool {
        self.gender == Gender::Female
    }

    pub fn age_band_tag(&self) -> Option<GroupTag> {
        self.group.iter().copied().find(GroupTag::is_age_band)
    }

    pub fn group_labels(&self) -> Vec<String> {
        self.group.iter().map(|t| t.label().to_string()).collect()
    }
}

/// A synthesized patient record. `medicine` is the gold label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Sequence number, unique within a population
    pub id: u64,
    pub age: u32,
    pub gender: Gender,
    /// Exactly one age-band tag plus any comorbidity tags
    pub group: Vec<GroupTag>,
    pub diagnosis: String,
    /// Ordered symptom terms
    pub symptom: Vec<String>,
    pub allergen: Vec<String>,
    /// Gold-label medicine ids
    pub medicine: Vec<DrugId>,
    /// Prior-condition narratives
    pub antecedents: Vec<String>,
    /// Concurrent unrelated medication ids
    pub on_medicine: Vec<DrugId>,
}

impl PatientRecord {
    pub fn demographics(&self) -> Demographics {
        Demographics {
            age: self.age,
            gender: self.gender,
            group: self.group.clone(),
            allergen: self.allergen.clone(),
        }
    }

    /// Exactly one age-band tag, and it matches the age.
    pub fn has_consistent_age_band(&self) -> bool {
        let bands: Vec<&GroupTag> = self.group.iter().filter(|t| t.is_age_band()).collect();
        bands.len() == 1 && *bands[0] == GroupTag::age_band(self.age)
    }

    /// No id appears in both `medicine` and `on_medicine`.
    pub fn medicine_disjoint_from_on_medicine(&self) -> bool {
        !self.medicine.iter().any(|m| self.on_medicine.contains(m))
    }
}
