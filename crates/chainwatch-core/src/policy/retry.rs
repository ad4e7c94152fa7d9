//! Capped exponential backoff.
//!
//! The delay before retry `n` (1-based) is
//! `min(initial * multiplier^(n-1), max)`. With the fetch defaults that is
//! 2000ms, 3000ms, 4500ms, ... capped at 10000ms.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries (not counting the first try).
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
    /// Maximum delay (caps exponential growth).
    #[serde(with = "millis")]
    pub max_backoff: Duration,
    /// Multiplier applied after each failure.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_backoff: Duration::from_millis(1_000),
            max_backoff: Duration::from_millis(30_000),
            multiplier: 1.5,
        }
    }
}

/// Stateless retry policy — computes the delay for a given retry number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before the `attempt`-th retry (1-based), ignoring the budget.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms =
            self.config.initial_backoff.as_millis() as f64 * self.config.multiplier.powi(exponent);
        let cap_ms = self.config.max_backoff.as_millis() as f64;
        Duration::from_millis(base_ms.min(cap_ms).round() as u64)
    }

    /// Returns the delay before the `attempt`-th retry (1-based).
    /// Returns `None` if `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        Some(self.delay_for(attempt))
    }
}

/// Per-sequence retry state: how many retries have been taken and what the
/// next delay is.
///
/// A `Backoff` is owned by exactly one retry sequence (one fetch call, or
/// one subscriber's reconnect loop) and never shared.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            policy: RetryPolicy::new(config),
            attempts: 0,
        }
    }

    /// Retries consumed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Consume one retry and return its delay, or `None` when the budget is
    /// exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.policy.next_delay(self.attempts + 1)?;
        self.attempts += 1;
        Some(delay)
    }

    /// Back to zero retries and the initial delay.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
