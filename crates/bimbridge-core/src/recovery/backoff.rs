//! Exponential backoff with a delay cap and optional jitter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry/backoff policy: `delay(n) = min(initial · multiplier^(n-1), max)`.
///
/// Attempts are 1-based. Retries continue while `attempt <= max_retries`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
    /// Apply uniform ±25% jitter to each delay.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 5_000,
            max_retries: 5,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Deterministic delay for `attempt` (1-based), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let raw = self.initial_delay_ms as f64 * self.multiplier.powi(exponent as i32);
        Duration::from_millis(raw.min(self.max_delay_ms as f64) as u64)
    }

    /// Delay for `attempt`, jittered when enabled.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter {
            return base;
        }
        use rand::Rng;
        let factor: f64 = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    }

    /// Whether another retry is allowed at `attempt` (1-based).
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }
}
