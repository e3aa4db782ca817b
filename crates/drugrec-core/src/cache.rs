//! Append-only oracle call cache.

use std::collections::HashMap;

use drugrec_llm::{AuditRequest, CompletionOracle, OracleError, OracleResult, SymptomRequest};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Canonical request input → raw oracle response. Never evicted.
#[derive(Debug, Clone, Default)]
pub struct CallCache {
    entries: HashMap<String, String>,
    hits: u64,
    misses: u64,
}

impl CallCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            entries: entries.into_iter().collect(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&self, input: &str) -> Option<&str> {
        self.entries.get(input).map(String::as_str)
    }

    /// Record an exchange. An existing entry is kept.
    pub fn insert(&mut self, input: String, output: String) {
        self.entries.entry(input).or_insert(output);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// SHA-256 hex digest used as the persisted key.
    pub fn digest(input: &str) -> String {
        hex::encode(Sha256::digest(input.as_bytes()))
    }

    /// Cached response for `key`, or ask the oracle with the prompt and
    /// record the answer. Faults are never cached.
    pub fn get_or_complete<O, F>(&mut self, oracle: &O, key: &str, prompt: F) -> OracleResult<String>
    where
        O: CompletionOracle + ?Sized,
        F: FnOnce() -> String,
    {
        if let Some(hit) = self.entries.get(key) {
            self.hits += 1;
            return Ok(hit.clone());
        }
        self.misses += 1;
        let output = oracle.complete(&prompt())?;
        if output.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        debug!(key_digest = %Self::digest(key), "cached new oracle exchange");
        self.entries.insert(key.to_string(), output.clone());
        Ok(output)
    }
}

/// Typed completion calls routed through a [`CallCache`].
pub struct CachedCompletion<'a, O: ?Sized> {
    oracle: &'a O,
    cache: &'a mut CallCache,
}

impl<'a, O: CompletionOracle + ?Sized> CachedCompletion<'a, O> {
    pub fn new(oracle: &'a O, cache: &'a mut CallCache) -> Self {
        Self { oracle, cache }
    }

    /// Raw symptom narrative for a request.
    pub fn symptom(&mut self, request: &SymptomRequest) -> OracleResult<String> {
        self.cache
            .get_or_complete(self.oracle, &request.canonical_input(), || request.prompt())
    }

    /// Raw audit answer for a record.
    pub fn audit(&mut self, request: &AuditRequest) -> OracleResult<String> {
        self.cache
            .get_or_complete(self.oracle, &request.canonical_input(), || request.prompt())
    }
}
