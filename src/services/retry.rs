//! Retry policy shared by job execution and persona headshots.

use std::time::Duration;

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again once the delay has passed
    Retry(Duration),
    /// Attempt budget spent
    Exhausted,
}

/// Bounded attempts with linear backoff: attempt `n` waits `n * base_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before the attempt after `failed_attempts` failures.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        self.base_delay.saturating_mul(failed_attempts)
    }

    /// Decide what follows the `failed_attempts`-th failure.
    pub fn after_failure(&self, failed_attempts: u32) -> RetryDecision {
        if failed_attempts >= self.max_attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry(self.backoff(failed_attempts))
        }
    }
}
