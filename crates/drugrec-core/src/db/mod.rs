//! Database layer for generated populations.
//!
//! Population, diagnosis usage and the oracle call cache live in separate
//! tables and are each written in their own transaction.

mod records;
mod runs;
mod schema;

pub use schema::*;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

use crate::population::GenerationContext;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Drop every persisted artifact except the run log.
    pub fn reset(&mut self) -> DbResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM patients; DELETE FROM diagnosis_usage; DELETE FROM call_cache;",
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Persist all three artifacts, each independently.
    pub fn save_context(&mut self, ctx: &GenerationContext) -> DbResult<()> {
        self.save_population(&ctx.population)?;
        self.save_usage(&ctx.usage)?;
        self.save_cache(&ctx.cache)?;
        Ok(())
    }

    /// Rebuild a context for a resumed run. Usage is re-derived from the
    /// population so the counter always matches the records.
    pub fn load_context(&self) -> DbResult<GenerationContext> {
        let population = self.load_population()?;
        let cache = self.load_cache()?;
        Ok(GenerationContext::resume(population, cache))
    }
}
