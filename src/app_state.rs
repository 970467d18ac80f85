use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::clock::SystemClock;
use crate::services::coordinator::{BatchCoordinator, CoordinatorSettings};
use crate::services::image_api::ImageGenerator;
use crate::services::rate_limit::SlidingWindowLimiter;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<BatchCoordinator>,
    pub rate_limiter: Arc<SlidingWindowLimiter>,
}

impl AppState {
    /// One rate limiter for the whole process, shared by every batch.
    pub fn new(config: &AppConfig, generator: Arc<dyn ImageGenerator>) -> Self {
        let clock = Arc::new(SystemClock);
        let rate_limiter = Arc::new(SlidingWindowLimiter::per_minute(
            config.rate_limit_per_minute,
            clock.clone(),
        ));
        let coordinator = BatchCoordinator::new(
            generator,
            rate_limiter.clone(),
            clock,
            CoordinatorSettings::from_config(config),
        );
        Self::from_parts(coordinator, rate_limiter)
    }

    pub fn from_parts(coordinator: BatchCoordinator, rate_limiter: Arc<SlidingWindowLimiter>) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            rate_limiter,
        }
    }
}
