//! Completion oracle contract and test doubles.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::prompts::{AUDIT_INSTRUCTIONS, SPLITTER, SYMPTOM_SLOT};

/// Oracle faults. Every variant is treated as one consumed retry attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Oracle transport error: {0}")]
    Transport(String),

    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Oracle returned an empty response")]
    EmptyResponse,
}

pub type OracleResult<T> = Result<T, OracleError>;

/// A text-completion service. Identical prompts are assumed to yield
/// cache-equivalent answers.
pub trait CompletionOracle: Send + Sync {
    fn complete(&self, prompt: &str) -> OracleResult<String>;
}

impl<T: CompletionOracle + ?Sized> CompletionOracle for Arc<T> {
    fn complete(&self, prompt: &str) -> OracleResult<String> {
        (**self).complete(prompt)
    }
}

/// Imposes a per-call deadline on a blocking oracle.
///
/// Each call runs on a worker thread; on expiry the caller gets
/// [`OracleError::Timeout`] and the worker's late answer is dropped. A worker
/// whose inner call hangs cannot be cancelled and keeps its thread until the
/// call returns, so at most `max_in_flight` workers may be outstanding. Calls
/// beyond that fail fast with [`OracleError::Transport`].
pub struct TimeoutOracle<O> {
    inner: Arc<O>,
    timeout: Duration,
    max_in_flight: usize,
    in_flight: Arc<AtomicUsize>,
}

/// Default bound on outstanding workers.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

impl<O: CompletionOracle + 'static> TimeoutOracle<O> {
    pub fn new(inner: O, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            timeout,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Workers still running, including ones abandoned after a timeout.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Releases a worker slot when the worker finishes, even by panic.
struct WorkerSlot(Arc<AtomicUsize>);

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<O: CompletionOracle + 'static> CompletionOracle for TimeoutOracle<O> {
    fn complete(&self, prompt: &str) -> OracleResult<String> {
        let claimed = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_in_flight).then_some(n + 1)
            });
        if claimed.is_err() {
            return Err(OracleError::Transport(format!(
                "{} oracle calls still outstanding",
                self.max_in_flight
            )));
        }
        let slot = WorkerSlot(Arc::clone(&self.in_flight));

        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let prompt = prompt.to_string();
        thread::spawn(move || {
            let _slot = slot;
            // Receiver may be gone after a timeout.
            let _ = tx.send(inner.complete(&prompt));
        });
        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(OracleError::Timeout(self.timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(OracleError::Transport("oracle worker panicked".into()))
            }
        }
    }
}

/// Replays a fixed queue of responses, then falls back to a default.
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<OracleResult<String>>>,
    fallback: OracleResult<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new<I>(responses: I, fallback: OracleResult<String>) -> Self
    where
        I: IntoIterator<Item = OracleResult<String>>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            fallback,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl CompletionOracle for ScriptedOracle {
    fn complete(&self, prompt: &str) -> OracleResult<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let next = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Deterministic oracle that understands both prompt modes.
///
/// Symptom prompts are answered by echoing the request line with the `XX`
/// slot filled; audit prompts get a fixed code.
pub struct MockOracle {
    symptoms: String,
    audit_code: String,
    calls: Mutex<usize>,
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new("发热、乏力", "0")
    }
}

impl MockOracle {
    pub fn new(symptoms: &str, audit_code: &str) -> Self {
        Self {
            symptoms: symptoms.to_string(),
            audit_code: audit_code.to_string(),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or(0)
    }
}

impl CompletionOracle for MockOracle {
    fn complete(&self, prompt: &str) -> OracleResult<String> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        if prompt.starts_with(AUDIT_INSTRUCTIONS) {
            return Ok(format!("输出: {}", self.audit_code));
        }
        // The request line is the last one carrying the slot.
        let request = prompt
            .lines()
            .rev()
            .find(|l| l.contains(SPLITTER) && l.contains(SYMPTOM_SLOT))
            .ok_or(OracleError::EmptyResponse)?;
        let request = request.trim_start_matches("input:").trim();
        Ok(request.replacen(SYMPTOM_SLOT, &self.symptoms, 1))
    }
}
