//! SQLite schema definition.

/// Complete database schema.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Population
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id INTEGER PRIMARY KEY,
    age INTEGER NOT NULL,
    gender TEXT NOT NULL CHECK (gender IN ('male', 'female')),
    group_tags TEXT NOT NULL DEFAULT '[]',        -- JSON array of tags
    diagnosis TEXT NOT NULL,
    symptom TEXT NOT NULL DEFAULT '[]',           -- JSON array of strings
    allergen TEXT NOT NULL DEFAULT '[]',          -- JSON array of strings
    medicine TEXT NOT NULL DEFAULT '[]',          -- JSON array of drug ids
    antecedents TEXT NOT NULL DEFAULT '[]',       -- JSON array of strings
    on_medicine TEXT NOT NULL DEFAULT '[]',       -- JSON array of drug ids
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_patients_diagnosis ON patients(diagnosis);

-- ============================================================================
-- Diagnosis usage counter
-- ============================================================================

CREATE TABLE IF NOT EXISTS diagnosis_usage (
    diagnosis TEXT PRIMARY KEY,
    count INTEGER NOT NULL CHECK (count >= 0)
);

-- ============================================================================
-- Oracle call cache (append-only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS call_cache (
    digest TEXT PRIMARY KEY,                      -- SHA-256 of input
    input TEXT NOT NULL,
    output TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TRIGGER IF NOT EXISTS call_cache_no_update BEFORE UPDATE ON call_cache
BEGIN
    SELECT RAISE(ABORT, 'Call cache entries are immutable');
END;

-- ============================================================================
-- Run log
-- ============================================================================

CREATE TABLE IF NOT EXISTS generation_runs (
    run_id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    requested INTEGER NOT NULL,
    generated INTEGER NOT NULL,
    discarded INTEGER NOT NULL,
    degraded INTEGER NOT NULL,
    stopped_early INTEGER NOT NULL,
    report TEXT NOT NULL,                         -- JSON GenerationReport
    config TEXT NOT NULL                          -- JSON GenerationConfig
);
"#;
