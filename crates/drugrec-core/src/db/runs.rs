//! Generation run log.

use rusqlite::params;

use super::{Database, DbResult};
use crate::config::GenerationConfig;
use crate::population::GenerationReport;

impl Database {
    /// Record a finished run with its report and config.
    pub fn record_run(&self, report: &GenerationReport, config: &GenerationConfig) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO generation_runs (
                run_id, started_at, finished_at, requested, generated,
                discarded, degraded, stopped_early, report, config
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                report.run_id,
                report.started_at,
                report.finished_at,
                report.requested as i64,
                report.generated as i64,
                report.discarded() as i64,
                report.degraded as i64,
                report.stopped_early,
                serde_json::to_string(report)?,
                serde_json::to_string(config)?,
            ],
        )?;
        Ok(())
    }

    /// Past run reports, oldest first.
    pub fn list_runs(&self) -> DbResult<Vec<GenerationReport>> {
        let mut stmt = self
            .conn
            .prepare("SELECT report FROM generation_runs ORDER BY started_at, run_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut reports = Vec::new();
        for row in rows {
            reports.push(serde_json::from_str(&row?)?);
        }
        Ok(reports)
    }
}
