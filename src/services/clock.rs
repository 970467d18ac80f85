//! Clock port, so windows and backoff can be tested without real waiting.
//!
//! Waiting goes through the same clock that stamps deadlines, so a deadline
//! taken from `now()` is always reached by `sleep_until`.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Resolves once `now()` has reached `deadline`.
    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'_, ()>;
}

/// Tokio's clock; honours `tokio::time::pause` in tests.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep_until(deadline))
    }
}

/// Hand-advanced clock for unit tests. Sleepers wake on `advance`.
pub struct ManualClock {
    now: Mutex<Instant>,
    advanced: Notify,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
            advanced: Notify::new(),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
        self.advanced.notify_waiters();
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }

    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            loop {
                // Registered before the check so an advance in between is not missed.
                let advanced = self.advanced.notified();
                if self.now() >= deadline {
                    return;
                }
                advanced.await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_manual_sleep_wakes_on_advance() {
        let clock = Arc::new(ManualClock::new());
        let deadline = clock.now() + Duration::from_secs(30);

        let sleeper = tokio::spawn({
            let clock = clock.clone();
            async move { clock.sleep_until(deadline).await }
        });
        tokio::task::yield_now().await;
        assert!(!sleeper.is_finished());

        clock.advance(Duration::from_secs(10));
        tokio::task::yield_now().await;
        assert!(!sleeper.is_finished());

        clock.advance(Duration::from_secs(20));
        tokio::time::timeout(Duration::from_secs(1), sleeper)
            .await
            .unwrap()
            .unwrap();
    }
}
