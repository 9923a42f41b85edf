use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Declared side-effect class of a function capability.
///
/// The scheduler uses this to decide retry safety: `ReadOnly` and
/// `IdempotentWrite` tasks may be re-attempted after a failure,
/// `NonIdempotent` tasks fail terminally on the first error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectClass {
    ReadOnly,
    IdempotentWrite,
    NonIdempotent,
}

impl SideEffectClass {
    pub fn retry_safe(self) -> bool {
        !matches!(self, SideEffectClass::NonIdempotent)
    }
}

/// How the compiler treats kwargs that the function contract does not
/// declare.
///
/// - `Reject`: unknown kwargs fail compilation of that job (default).
/// - `Passthrough`: unknown kwargs are forwarded into the compiled unit as
///   opaque config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KwargStrictness {
    Reject,
    Passthrough,
}

impl Default for KwargStrictness {
    fn default() -> Self {
        KwargStrictness::Reject
    }
}

impl FromStr for KwargStrictness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(KwargStrictness::Reject),
            "passthrough" => Ok(KwargStrictness::Passthrough),
            other => Err(format!(
                "invalid kwarg strictness: {other} (expected \"reject\" or \"passthrough\")"
            )),
        }
    }
}

/// Retry configuration applied to retry-safe tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per further attempt.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Delay to apply before the given attempt. Attempt 0 is the first
    /// execution and has no delay; the exponent is capped so long retry
    /// chains cannot overflow into absurd sleeps.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 1).min(6);
        self.backoff_base.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}
