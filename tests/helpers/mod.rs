//! Test doubles and harness utilities for batch integration tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use mockup_studio::models::event::BatchEvent;
use mockup_studio::services::catalog::CatalogMode;
use mockup_studio::services::clock::SystemClock;
use mockup_studio::services::coordinator::{BatchCoordinator, CoordinatorSettings};
use mockup_studio::services::image_api::{GeneratedImage, ImageApiError, ImageGenerator, ImageRequest};
use mockup_studio::services::rate_limit::RateLimiter;
use mockup_studio::services::retry::RetryPolicy;
use mockup_studio::services::scheduler::SchedulerConfig;

/// 1x1 PNG signature bytes; enough for MIME checks.
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// How the fake upstream answers a call.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Succeed,
    Fail,
    Hang,
    SucceedAfter(Duration),
}

/// Fake image API that answers headshot and job calls independently.
pub struct FakeGenerator {
    headshot: Outcome,
    job: Outcome,
    pub headshot_calls: AtomicUsize,
    pub job_calls: AtomicUsize,
    pub call_times: Mutex<Vec<tokio::time::Instant>>,
}

impl FakeGenerator {
    pub fn new(headshot: Outcome, job: Outcome) -> Arc<Self> {
        Arc::new(Self {
            headshot,
            job,
            headshot_calls: AtomicUsize::new(0),
            job_calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
        })
    }

    pub fn healthy() -> Arc<Self> {
        Self::new(Outcome::Succeed, Outcome::Succeed)
    }

    pub fn job_calls(&self) -> usize {
        self.job_calls.load(Ordering::SeqCst)
    }

    pub fn headshot_calls(&self) -> usize {
        self.headshot_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(&self, request: &ImageRequest<'_>) -> Result<GeneratedImage, ImageApiError> {
        self.call_times.lock().push(tokio::time::Instant::now());
        let outcome = if request.prompt.starts_with("studio headshot portrait") {
            self.headshot_calls.fetch_add(1, Ordering::SeqCst);
            self.headshot
        } else {
            self.job_calls.fetch_add(1, Ordering::SeqCst);
            self.job
        };

        match outcome {
            Outcome::Succeed => {}
            Outcome::Fail => {
                return Err(ImageApiError::Status {
                    status: 500,
                    body: "upstream error".to_string(),
                })
            }
            Outcome::Hang => std::future::pending::<()>().await,
            Outcome::SucceedAfter(delay) => tokio::time::sleep(delay).await,
        }

        Ok(GeneratedImage {
            data: PNG_BYTES.to_vec(),
            mime_type: "image/png".to_string(),
        })
    }
}

/// Limiter that admits everything immediately.
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn acquire(&self) {}
}

/// Three slots, 5s deadline, three attempts with 100ms linear backoff.
pub fn test_settings() -> CoordinatorSettings {
    CoordinatorSettings {
        scheduler: SchedulerConfig {
            max_concurrent_jobs: 3,
            job_timeout: Duration::from_secs(5),
            retry: RetryPolicy::new(3, Duration::from_millis(100)),
        },
        max_batch_jobs: 50,
        persona_headshot: true,
        catalog_mode: CatalogMode::Strict,
    }
}

pub fn coordinator(
    generator: Arc<FakeGenerator>,
    rate_limiter: Arc<dyn RateLimiter>,
    settings: CoordinatorSettings,
) -> BatchCoordinator {
    BatchCoordinator::new(generator, rate_limiter, Arc::new(SystemClock), settings)
}

/// Receive until every sender is dropped.
pub async fn collect_events(mut rx: mpsc::UnboundedReceiver<BatchEvent>) -> Vec<BatchEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

pub fn count(events: &[BatchEvent], name: &str) -> usize {
    events.iter().filter(|e| e.name() == name).count()
}
