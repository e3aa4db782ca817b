//! Parsing of completion-oracle output.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prompts::SPLITTER;

/// Position of the symptom field in a narrative line.
const SYMPTOM_FIELD: usize = 3;

/// Extraction errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Malformed narrative: expected at least 4 fields, got {0}")]
    MalformedNarrative(usize),

    #[error("Empty symptom field in narrative")]
    EmptySymptom,

    #[error("Malformed audit code: {0}")]
    MalformedAudit(String),
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Extract the symptom field (4th field) from a narrative line.
///
/// Oracles sometimes echo an `output:` label or wrap the answer in extra
/// lines, so the first line with enough fields wins.
pub fn extract_symptom_field(output: &str) -> ExtractionResult<String> {
    let mut widest = 0;
    for line in output.lines() {
        let fields: Vec<&str> = line.split(SPLITTER).collect();
        widest = widest.max(fields.len());
        if fields.len() > SYMPTOM_FIELD {
            let symptom = fields[SYMPTOM_FIELD].trim();
            if symptom.is_empty() {
                return Err(ExtractionError::EmptySymptom);
            }
            return Ok(symptom.to_string());
        }
    }
    Err(ExtractionError::MalformedNarrative(widest))
}

/// Option-returning variant used where a malformed line is simply "not well-formed".
pub fn extract_symptom(output: &str) -> Option<String> {
    extract_symptom_field(output).ok()
}

/// Split a symptom field into ordered terms.
pub fn split_symptoms(field: &str) -> Vec<String> {
    field
        .split(['、', ',', '，'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Inconsistency classes reported by the audit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    GenderMismatch,
    AgeMismatch,
    SymptomMismatch,
    MalformedDiagnosis,
    HistoryGenderMismatch,
    HistoryAgeMismatch,
    MalformedHistory,
    /// A positive code outside the known taxonomy.
    Other(u32),
}

impl ErrorClass {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(Self::GenderMismatch),
            2 => Some(Self::AgeMismatch),
            3 => Some(Self::SymptomMismatch),
            4 => Some(Self::MalformedDiagnosis),
            5 => Some(Self::HistoryGenderMismatch),
            6 => Some(Self::HistoryAgeMismatch),
            7 => Some(Self::MalformedHistory),
            n => Some(Self::Other(n)),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::GenderMismatch => 1,
            Self::AgeMismatch => 2,
            Self::SymptomMismatch => 3,
            Self::MalformedDiagnosis => 4,
            Self::HistoryGenderMismatch => 5,
            Self::HistoryAgeMismatch => 6,
            Self::MalformedHistory => 7,
            Self::Other(n) => *n,
        }
    }

    /// True for classes that concern the history narrative.
    pub fn is_history(&self) -> bool {
        matches!(
            self,
            Self::HistoryGenderMismatch | Self::HistoryAgeMismatch | Self::MalformedHistory
        )
    }
}

/// Parsed audit result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditVerdict {
    pub errors: Vec<ErrorClass>,
}

impl AuditVerdict {
    pub fn clean() -> Self {
        Self { errors: Vec::new() }
    }

    /// True only for the explicit "no error" code.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for AuditVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "0");
        }
        let codes: Vec<String> = self.errors.iter().map(|e| e.code().to_string()).collect();
        write!(f, "{}", codes.join(","))
    }
}

/// Parse an audit response such as `输出: 1,5` into a verdict.
///
/// Text after the first colon (ASCII or full-width) on the first line that
/// carries one is taken as the code list. Without any colon, the first
/// non-empty line is read as a bare code list.
pub fn parse_audit_output(output: &str) -> ExtractionResult<AuditVerdict> {
    let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
    let line = lines
        .clone()
        .find(|l| l.contains([':', '：']))
        .or_else(|| lines.next())
        .ok_or_else(|| ExtractionError::MalformedAudit(output.to_string()))?;

    let code_part = match line.find([':', '：']) {
        Some(pos) => {
            let sep_len = line[pos..].chars().next().map_or(1, char::len_utf8);
            &line[pos + sep_len..]
        }
        None => line,
    };
    let code_part = code_part
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim();

    let mut errors = Vec::new();
    let mut saw_zero = false;
    for token in code_part.split([',', '，']).map(str::trim) {
        let code: u32 = token
            .parse()
            .map_err(|_| ExtractionError::MalformedAudit(output.to_string()))?;
        match ErrorClass::from_code(code) {
            Some(class) if !errors.contains(&class) => errors.push(class),
            Some(_) => {}
            None => saw_zero = true,
        }
    }

    if errors.is_empty() && !saw_zero {
        return Err(ExtractionError::MalformedAudit(output.to_string()));
    }
    Ok(AuditVerdict { errors })
}
