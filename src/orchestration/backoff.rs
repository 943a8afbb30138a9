//! # Retry Backoff
//!
//! Exponential backoff between attempts of a failed step:
//! `delay(n) = min(base * multiplier^(n-1), max)` where `n` is the number of
//! attempts already made.

use crate::config::BackoffConfig;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier: multiplier.max(1.0),
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            config.multiplier,
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Retry immediately
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, 1.0, Duration::ZERO)
    }

    /// Delay to wait after the `attempts`-th failed attempt
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempts - 1).unwrap_or(i32::MAX);
        let scaled_ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = scaled_ms.min(self.max_delay.as_millis() as f64);

        if capped_ms.is_finite() {
            Duration::from_millis(capped_ms as u64)
        } else {
            self.max_delay
        }
    }

    /// When a step that last failed at `last_failure_at` may run again
    pub fn next_retry_at(&self, last_failure_at: DateTime<Utc>, attempts: u32) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.delay_for_attempt(attempts))
            .unwrap_or_else(|_| chrono::Duration::zero());
        last_failure_at + delay
    }
}
