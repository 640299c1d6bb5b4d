//! Retry policy for remote calls.
//!
//! Every remote call in the pipeline is single-attempt by default. A
//! [`RetryPolicy`] with `max_retries > 0` lets callers opt into retrying
//! transient failures (transport errors, HTTP 429 and 5xx).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How many times, and how patiently, to retry a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first. `0` means single-attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }

    pub const fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::none()
        }
    }

    /// Whether another attempt is allowed after `failures` failed attempts.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures <= self.max_retries
    }

    /// Pause before retry number `retry` (1-based).
    ///
    /// Doubles from `base_delay_ms` up to `max_delay_ms`, plus up to 25%
    /// random jitter so parallel workers hitting the same outage spread out.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let doublings = retry.saturating_sub(1).min(32);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << doublings)
            .min(self.max_delay_ms);
        let jitter = rand::random::<u64>() % (delay / 4 + 1);
        Duration::from_millis(delay + jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Whether an HTTP status is worth retrying.
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
