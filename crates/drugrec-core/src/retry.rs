//! Bounded retry with an explicit exhaustion policy.
//!
//! A resolver hands the policy one closure per attempt. The closure either
//! accepts a value, or asks for another attempt while optionally offering a
//! fallback candidate. When the budget runs out, the policy decides whether
//! the most recent fallback candidate is accepted (degraded success) or the
//! whole run is reported as exhausted.

/// What to do when the attempt budget runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnExhaustion {
    /// Accept the most recent fallback candidate, if any
    AcceptLast,
    /// Report exhaustion; the caller substitutes its own sentinel
    Fail,
}

/// Result of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    Accept(T),
    /// Try again; `Some` keeps a candidate for degraded acceptance.
    Retry(Option<T>),
}

/// Final outcome of a retry run.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    Accepted { value: T, attempts: u32 },
    Degraded { value: T, attempts: u32 },
    Exhausted { attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Accepted { attempts, .. }
            | RetryOutcome::Degraded { attempts, .. }
            | RetryOutcome::Exhausted { attempts } => *attempts,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RetryOutcome::Degraded { .. })
    }

    /// The value, whether fully accepted or degraded.
    pub fn into_value(self) -> Option<T> {
        match self {
            RetryOutcome::Accepted { value, .. } | RetryOutcome::Degraded { value, .. } => {
                Some(value)
            }
            RetryOutcome::Exhausted { .. } => None,
        }
    }
}

/// Attempt budget plus exhaustion behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub on_exhaustion: OnExhaustion,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, on_exhaustion: OnExhaustion) -> Self {
        Self {
            max_attempts,
            on_exhaustion,
        }
    }

    /// Run `attempt` (called with the 1-based attempt number) until it
    /// accepts or the budget is spent.
    pub fn run<T, F>(&self, mut attempt: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Attempt<T>,
    {
        let mut fallback: Option<T> = None;
        for n in 1..=self.max_attempts {
            match attempt(n) {
                Attempt::Accept(value) => {
                    return RetryOutcome::Accepted { value, attempts: n };
                }
                Attempt::Retry(Some(candidate)) => fallback = Some(candidate),
                Attempt::Retry(None) => {}
            }
        }

        let attempts = self.max_attempts;
        match (self.on_exhaustion, fallback) {
            (OnExhaustion::AcceptLast, Some(value)) => RetryOutcome::Degraded { value, attempts },
            _ => RetryOutcome::Exhausted { attempts },
        }
    }
}
