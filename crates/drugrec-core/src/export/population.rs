//! Population export for downstream training.

use serde::{Deserialize, Serialize};

use crate::knowledge::KnowledgeBase;
use crate::models::{DrugId, PatientRecord};

/// A medicine id with its display name, when known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedDrug {
    pub id: DrugId,
    pub name: Option<String>,
}

/// One exported record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedRecord {
    pub id: u64,
    pub age: u32,
    pub gender: String,
    pub group: Vec<String>,
    pub diagnosis: String,
    pub symptom: Vec<String>,
    pub allergen: Vec<String>,
    pub medicine: Vec<NamedDrug>,
    pub antecedents: Vec<String>,
    pub on_medicine: Vec<NamedDrug>,
}

/// Exported population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationExport {
    /// Export timestamp
    pub exported_at: String,
    pub total_records: usize,
    pub records: Vec<ExportedRecord>,
}

impl PopulationExport {
    /// Export with ids only.
    pub fn new(population: &[PatientRecord]) -> Self {
        Self::build(population, |_| None)
    }

    /// Export with medicine names looked up in the knowledge base.
    pub fn with_names<K: KnowledgeBase + ?Sized>(population: &[PatientRecord], knowledge: &K) -> Self {
        Self::build(population, |id| knowledge.drug_detail(id).map(|d| d.name))
    }

    fn build<F>(population: &[PatientRecord], name_of: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let named = |ids: &[DrugId]| -> Vec<NamedDrug> {
            ids.iter()
                .map(|id| NamedDrug {
                    id: id.clone(),
                    name: name_of(id),
                })
                .collect()
        };

        let records = population
            .iter()
            .map(|r| ExportedRecord {
                id: r.id,
                age: r.age,
                gender: r.gender.label().to_string(),
                group: r.demographics().group_labels(),
                diagnosis: r.diagnosis.clone(),
                symptom: r.symptom.clone(),
                allergen: r.allergen.clone(),
                medicine: named(&r.medicine),
                antecedents: r.antecedents.clone(),
                on_medicine: named(&r.on_medicine),
            })
            .collect::<Vec<_>>();

        Self {
            exported_at: chrono::Utc::now().to_rfc3339(),
            total_records: records.len(),
            records,
        }
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to CSV format. List fields are joined with `;`.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("id,age,gender,group,diagnosis,symptom,allergen,medicine,medicine_names,antecedents,on_medicine\n");

        for r in &self.records {
            let medicine_ids: Vec<&str> = r.medicine.iter().map(|d| d.id.as_str()).collect();
            let medicine_names: Vec<&str> = r
                .medicine
                .iter()
                .map(|d| d.name.as_deref().unwrap_or(""))
                .collect();
            let on_ids: Vec<&str> = r.on_medicine.iter().map(|d| d.id.as_str()).collect();
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{}\n",
                r.id,
                r.age,
                escape_csv(&r.gender),
                escape_csv(&r.group.join(";")),
                escape_csv(&r.diagnosis),
                escape_csv(&r.symptom.join(";")),
                escape_csv(&r.allergen.join(";")),
                escape_csv(&medicine_ids.join(";")),
                escape_csv(&medicine_names.join(";")),
                escape_csv(&r.antecedents.join(";")),
                escape_csv(&on_ids.join(";")),
            ));
        }

        csv
    }
}

/// Escape a CSV field.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
