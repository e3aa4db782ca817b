//! Population, usage and cache persistence.

use rusqlite::params;

use super::{Database, DbError, DbResult};
use crate::cache::CallCache;
use crate::models::{Gender, PatientRecord};
use crate::population::DiagnosisUsage;

impl Database {
    /// Upsert every record in one transaction.
    pub fn save_population(&mut self, population: &[PatientRecord]) -> DbResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO patients (
                    id, age, gender, group_tags, diagnosis, symptom,
                    allergen, medicine, antecedents, on_medicine
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )?;
            for record in population {
                stmt.execute(params![
                    record.id as i64,
                    record.age,
                    gender_code(record.gender),
                    serde_json::to_string(&record.group)?,
                    record.diagnosis,
                    serde_json::to_string(&record.symptom)?,
                    serde_json::to_string(&record.allergen)?,
                    serde_json::to_string(&record.medicine)?,
                    serde_json::to_string(&record.antecedents)?,
                    serde_json::to_string(&record.on_medicine)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All persisted records, ordered by id.
    pub fn load_population(&self) -> DbResult<Vec<PatientRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, age, gender, group_tags, diagnosis, symptom,
                   allergen, medicine, antecedents, on_medicine
            FROM patients
            ORDER BY id
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
            ))
        })?;

        let mut population = Vec::new();
        for row in rows {
            let (id, age, gender, group, diagnosis, symptom, allergen, medicine, antecedents, on_medicine) =
                row?;
            let gender = Gender::from_label(&gender).ok_or_else(|| DbError::Corrupt {
                table: "patients",
                detail: format!("record {} has gender {:?}", id, gender),
            })?;
            population.push(PatientRecord {
                id: id as u64,
                age,
                gender,
                group: serde_json::from_str(&group)?,
                diagnosis,
                symptom: serde_json::from_str(&symptom)?,
                allergen: serde_json::from_str(&allergen)?,
                medicine: serde_json::from_str(&medicine)?,
                antecedents: serde_json::from_str(&antecedents)?,
                on_medicine: serde_json::from_str(&on_medicine)?,
            });
        }
        Ok(population)
    }

    pub fn count_patients(&self) -> DbResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Replace the usage table in one transaction.
    pub fn save_usage(&mut self, usage: &DiagnosisUsage) -> DbResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM diagnosis_usage", [])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO diagnosis_usage (diagnosis, count) VALUES (?1, ?2)")?;
            for (diagnosis, count) in usage.iter() {
                stmt.execute(params![diagnosis, count])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_usage(&self) -> DbResult<DiagnosisUsage> {
        let mut stmt = self
            .conn
            .prepare("SELECT diagnosis, count FROM diagnosis_usage ORDER BY diagnosis")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)))?;
        rows.collect::<Result<DiagnosisUsage, _>>().map_err(Into::into)
    }

    /// Append new cache entries; existing digests are left untouched.
    pub fn save_cache(&mut self, cache: &CallCache) -> DbResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO call_cache (digest, input, output) VALUES (?1, ?2, ?3)",
            )?;
            for (input, output) in cache.entries() {
                stmt.execute(params![CallCache::digest(input), input, output])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_cache(&self) -> DbResult<CallCache> {
        let mut stmt = self.conn.prepare("SELECT input, output FROM call_cache")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let entries = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(CallCache::from_entries(entries))
    }
}

fn gender_code(gender: Gender) -> &'static str {
    match gender {
        Gender::Male => "male",
        Gender::Female => "female",
    }
}
