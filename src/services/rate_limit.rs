//! Process-wide admission control for upstream calls.
//!
//! Every batch in the process shares one limiter, so the window is kept as a
//! log of admission instants behind a mutex rather than a per-batch counter.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::services::clock::Clock;

/// Grants permission for one upstream call. Waiting is backpressure, never an error.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn acquire(&self);
}

/// Sliding-window limiter: at most `limit` admissions in any rolling `window`.
pub struct SlidingWindowLimiter {
    limit: usize,
    window: Duration,
    admitted: Mutex<VecDeque<tokio::time::Instant>>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit: limit.max(1),
            window,
            admitted: Mutex::new(VecDeque::new()),
            clock,
        }
    }

    pub fn per_minute(limit: usize, clock: Arc<dyn Clock>) -> Self {
        Self::new(limit, Duration::from_secs(60), clock)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Admit now, or report how long until the oldest admission leaves the window.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = self.clock.now();
        let mut admitted = self.admitted.lock();

        while let Some(&oldest) = admitted.front() {
            if now.duration_since(oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }

        if admitted.len() < self.limit {
            admitted.push_back(now);
            return Ok(());
        }

        // Window is full, so the front entry exists.
        let oldest = admitted.front().copied().unwrap_or(now);
        Err(self.window.saturating_sub(now.duration_since(oldest)))
    }

    /// Admissions currently inside the window.
    pub fn in_window(&self) -> usize {
        let now = self.clock.now();
        self.admitted
            .lock()
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => {
                    tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
                    metrics::counter!("mockup_rate_limit_waits").increment(1);
                    let deadline = self.clock.now() + wait.max(Duration::from_millis(1));
                    self.clock.sleep_until(deadline).await;
                }
            }
        }
    }
}
