//! Job execution under bounded concurrency, a shared rate limit, per-call
//! deadlines and bounded retries.
//!
//! Each job runs in its own task and moves through
//! `pending -> processing -> {completed | failed}`, returning to `pending`
//! while it waits out a retry backoff. Admission for every attempt takes, in
//! order: the backoff deadline, a concurrency slot, a rate-limit token.
//! Sibling jobs never observe each other's failures.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::event::BatchEvent;
use crate::models::job::{GenerationJob, JobStatus};
use crate::models::persona::PersonaLock;
use crate::services::clock::Clock;
use crate::services::image_api::{ImageApiError, ImageGenerator, ImageRequest};
use crate::services::locks::compile_prompt;
use crate::services::rate_limit::RateLimiter;
use crate::services::retry::{RetryDecision, RetryPolicy};

/// Sink for progress events; a closed receiver only stops delivery.
pub type EventSink = mpsc::UnboundedSender<BatchEvent>;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub max_concurrent_jobs: usize,
    pub job_timeout: Duration,
    pub retry: RetryPolicy,
}

/// Read-only inputs shared by every job of one run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub persona: Option<Arc<PersonaLock>>,
    /// Reference for products shown without a model.
    pub design_image: Option<Arc<Vec<u8>>>,
    pub negative_extra: &'static str,
}

impl RunContext {
    fn reference_image(&self) -> Option<&[u8]> {
        self.persona
            .as_deref()
            .and_then(PersonaLock::reference_bytes)
            .or_else(|| self.design_image.as_deref().map(Vec::as_slice))
    }
}

pub struct Scheduler {
    generator: Arc<dyn ImageGenerator>,
    rate_limiter: Arc<dyn RateLimiter>,
    slots: Arc<Semaphore>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        rate_limiter: Arc<dyn RateLimiter>,
        slots: Arc<Semaphore>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            generator,
            rate_limiter,
            slots,
            clock,
            config,
        }
    }

    /// Run every job to a terminal state, or until `cancel` fires.
    ///
    /// Jobs come back in their original order. Jobs never admitted before
    /// cancellation are returned still `pending`. Dropping the returned future
    /// cancels every job task it spawned.
    pub async fn run(
        &self,
        jobs: Vec<GenerationJob>,
        context: RunContext,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Vec<GenerationJob> {
        let total = jobs.len();
        metrics::counter!("mockup_jobs_total").increment(total as u64);
        tracing::info!(
            jobs = total,
            max_concurrent = self.config.max_concurrent_jobs,
            "Scheduler starting"
        );

        // Job tasks outlive this future unless told otherwise.
        let cancel = cancel.child_token();
        let _cancel_on_drop = cancel.clone().drop_guard();

        let runner = Arc::new(JobRunner {
            generator: Arc::clone(&self.generator),
            rate_limiter: Arc::clone(&self.rate_limiter),
            slots: Arc::clone(&self.slots),
            clock: Arc::clone(&self.clock),
            config: self.config,
            context,
            events,
            settled: AtomicUsize::new(0),
            checkpoints: Mutex::new(HashMap::new()),
            total,
            cancel,
        });

        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let snapshot = job.clone();
                let handle = tokio::spawn(Arc::clone(&runner).drive(job));
                (snapshot, handle)
            })
            .collect();

        let mut finished = Vec::with_capacity(total);
        for (snapshot, handle) in handles {
            match handle.await {
                Ok(job) => finished.push(job),
                Err(e) => {
                    tracing::error!(job_id = %snapshot.id, error = %e, "Job task crashed");
                    let latest = runner.checkpoints.lock().remove(&snapshot.id).unwrap_or(snapshot);
                    finished.push(runner.crashed(latest));
                }
            }
        }

        tracing::info!(
            jobs = total,
            settled = runner.settled.load(Ordering::SeqCst),
            "Scheduler finished"
        );
        finished
    }
}

/// State shared by the job tasks of one run.
struct JobRunner {
    generator: Arc<dyn ImageGenerator>,
    rate_limiter: Arc<dyn RateLimiter>,
    slots: Arc<Semaphore>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    context: RunContext,
    events: EventSink,
    settled: AtomicUsize,
    /// Last published state of each job, for recovering crashed tasks.
    checkpoints: Mutex<HashMap<Uuid, GenerationJob>>,
    total: usize,
    cancel: CancellationToken,
}

impl JobRunner {
    async fn drive(self: Arc<Self>, mut job: GenerationJob) -> GenerationJob {
        let compiled = compile_prompt(
            &job.locks,
            self.context.persona.as_deref(),
            job.variant.size,
            self.context.negative_extra,
        );
        let request = ImageRequest {
            prompt: &compiled.prompt,
            negative_prompt: &compiled.negative_prompt,
            reference_image: self.context.reference_image(),
        };

        loop {
            if let Some(eligible_at) = job.retry.next_eligible_at {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return job,
                    _ = self.clock.sleep_until(eligible_at) => {}
                }
            }

            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return job,
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!(job_id = %job.id, "Concurrency slots closed, job not admitted");
                        return job;
                    }
                },
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return job,
                _ = self.rate_limiter.acquire() => {}
            }

            if let Err(e) = job.start() {
                tracing::error!(job_id = %job.id, error = %e, "Job could not start");
                return job;
            }
            tracing::info!(
                job_id = %job.id,
                attempt = job.retry.attempt,
                last_error = job.retry.last_error.as_deref().unwrap_or("none"),
                "Job admitted"
            );
            self.emit_update(&job);

            metrics::gauge!("mockup_jobs_in_flight").increment(1.0);
            let started = std::time::Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = tokio::time::timeout(self.config.job_timeout, self.generator.generate(&request)) => {
                    Some(result.unwrap_or(Err(ImageApiError::Timeout(self.config.job_timeout))))
                }
            };
            drop(permit);
            metrics::gauge!("mockup_jobs_in_flight").decrement(1.0);

            match outcome {
                None => {
                    tracing::info!(job_id = %job.id, "Job cancelled in flight");
                    if job.abort("cancelled").is_ok() {
                        self.emit_failed(&job);
                    }
                    return job;
                }
                Some(Ok(image)) => {
                    metrics::histogram!("mockup_generation_seconds")
                        .record(started.elapsed().as_secs_f64());
                    metrics::counter!("mockup_jobs_completed").increment(1);
                    let event_image = image.clone();
                    if let Err(e) = job.complete(image) {
                        tracing::error!(job_id = %job.id, error = %e, "Job could not complete");
                        return job;
                    }
                    tracing::info!(
                        job_id = %job.id,
                        attempt = job.retry.attempt,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Job completed"
                    );
                    let completed = self.settle();
                    self.send(BatchEvent::JobResult {
                        job_id: job.id,
                        variant: job.variant.clone(),
                        image_bytes: event_image.data,
                        mime_type: event_image.mime_type,
                        completed,
                        total: self.total,
                    });
                    return job;
                }
                Some(Err(error)) => {
                    let failed_attempts = job.retry_count() + 1;
                    match self.config.retry.after_failure(failed_attempts) {
                        RetryDecision::Retry(delay) => {
                            tracing::warn!(
                                job_id = %job.id,
                                retry_count = failed_attempts,
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "Job attempt failed, re-queued"
                            );
                            metrics::counter!("mockup_job_retries").increment(1);
                            if job.requeue(error.to_string(), self.clock.now(), delay).is_err() {
                                return job;
                            }
                            self.emit_update(&job);
                        }
                        RetryDecision::Exhausted => {
                            tracing::warn!(
                                job_id = %job.id,
                                retry_count = failed_attempts,
                                error = %error,
                                "Job failed after max retries"
                            );
                            metrics::counter!("mockup_jobs_failed").increment(1);
                            let message = format!(
                                "Generation failed after {} attempts: {}",
                                failed_attempts, error
                            );
                            if job.fail(message).is_ok() {
                                self.emit_failed(&job);
                            }
                            return job;
                        }
                    }
                }
            }
        }
    }

    /// Record a job whose task died, from its last published state. The job is
    /// failed without consuming a retry.
    fn crashed(&self, mut job: GenerationJob) -> GenerationJob {
        if job.status().is_terminal() {
            return job;
        }
        if job.status() == JobStatus::Pending {
            if job.start().is_err() {
                return job;
            }
            self.emit_update(&job);
        } else {
            metrics::gauge!("mockup_jobs_in_flight").decrement(1.0);
        }
        if job.abort("job task crashed").is_ok() {
            metrics::counter!("mockup_jobs_failed").increment(1);
            self.emit_failed(&job);
        }
        job
    }

    fn settle(&self) -> usize {
        self.settled.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn emit_update(&self, job: &GenerationJob) {
        self.checkpoints.lock().insert(job.id, job.clone());
        self.send(BatchEvent::JobUpdate {
            job_id: job.id,
            status: job.status(),
            retry_count: job.retry_count(),
            completed: self.settled.load(Ordering::SeqCst),
            total: self.total,
        });
    }

    fn emit_failed(&self, job: &GenerationJob) {
        let completed = self.settle();
        self.send(BatchEvent::JobFailed {
            job_id: job.id,
            variant: job.variant.clone(),
            error: job.error.clone().unwrap_or_default(),
            retry_count: job.retry_count(),
            completed,
            total: self.total,
        });
    }

    fn send(&self, event: BatchEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Event receiver dropped, event discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{JobStatus, JobVariant};
    use crate::models::lock::{JobLocks, LockCategory, VariantLock};
    use crate::models::product::{CameraAngle, Size};
    use crate::services::clock::SystemClock;
    use crate::services::image_api::GeneratedImage;
    use async_trait::async_trait;

    struct Unlimited;

    #[async_trait]
    impl RateLimiter for Unlimited {
        async fn acquire(&self) {}
    }

    /// Fails the first `failures` calls, optionally hangs, and tracks peak concurrency.
    struct Scripted {
        failures: u32,
        hang: bool,
        latency: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Scripted {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                hang: false,
                latency: Duration::from_millis(200),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ImageGenerator for Scripted {
        async fn generate(&self, _request: &ImageRequest<'_>) -> Result<GeneratedImage, ImageApiError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if self.hang {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(self.latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if call as u32 <= self.failures {
                return Err(ImageApiError::Status {
                    status: 500,
                    body: "upstream error".to_string(),
                });
            }
            Ok(GeneratedImage {
                data: vec![0xFF, 0xD8, 0xFF],
                mime_type: "image/jpeg".to_string(),
            })
        }
    }

    /// Fails the first call, then panics.
    struct FailThenPanic {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageGenerator for FailThenPanic {
        async fn generate(&self, _request: &ImageRequest<'_>) -> Result<GeneratedImage, ImageApiError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ImageApiError::RateLimited);
            }
            panic!("generator bug");
        }
    }

    fn jobs(n: usize) -> Vec<GenerationJob> {
        let lock = |c| Arc::new(VariantLock::new(c, "x"));
        (0..n)
            .map(|i| {
                GenerationJob::new(
                    i,
                    JobVariant {
                        color: format!("color-{}", i),
                        angle: CameraAngle::Front,
                        size: Size::M,
                    },
                    JobLocks {
                        product: lock(LockCategory::Product),
                        color: lock(LockCategory::Color),
                        camera: lock(LockCategory::Camera),
                        lighting: lock(LockCategory::Lighting),
                        design: lock(LockCategory::Design),
                    },
                )
            })
            .collect()
    }

    fn scheduler(generator: Arc<Scripted>, max_concurrent: usize, max_retries: u32) -> Scheduler {
        Scheduler::new(
            generator,
            Arc::new(Unlimited),
            Arc::new(Semaphore::new(max_concurrent)),
            Arc::new(SystemClock),
            SchedulerConfig {
                max_concurrent_jobs: max_concurrent,
                job_timeout: Duration::from_secs(5),
                retry: RetryPolicy::new(max_retries, Duration::from_millis(100)),
            },
        )
    }

    async fn run(
        scheduler: &Scheduler,
        jobs: Vec<GenerationJob>,
    ) -> (Vec<GenerationJob>, Vec<BatchEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let finished = scheduler
            .run(jobs, RunContext::default(), tx, CancellationToken::new())
            .await;
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (finished, events)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_slots() {
        let generator = Arc::new(Scripted::new(0));
        let scheduler = scheduler(generator.clone(), 3, 3);

        let (finished, _) = run(&scheduler, jobs(10)).await;

        assert_eq!(finished.len(), 10);
        assert!(finished.iter().all(|j| j.status() == JobStatus::Completed));
        assert_eq!(generator.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_count_bounded_by_events() {
        let generator = Arc::new(Scripted::new(0));
        let scheduler = scheduler(generator, 2, 3);

        let (_, events) = run(&scheduler, jobs(6)).await;

        let mut processing = 0i32;
        let mut peak = 0;
        for event in &events {
            match event {
                BatchEvent::JobUpdate { status: JobStatus::Processing, .. } => processing += 1,
                BatchEvent::JobUpdate { status: JobStatus::Pending, .. }
                | BatchEvent::JobResult { .. }
                | BatchEvent::JobFailed { .. } => processing -= 1,
                _ => {}
            }
            peak = peak.max(processing);
        }
        assert!(peak <= 2);
        assert_eq!(processing, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_attempt_k_has_k_minus_one_retries() {
        let generator = Arc::new(Scripted::new(2));
        let scheduler = scheduler(generator.clone(), 1, 3);

        let (finished, events) = run(&scheduler, jobs(1)).await;

        let job = &finished[0];
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.retry_count(), 2);
        assert_eq!(job.retry.attempt, 3);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);

        let statuses: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::JobUpdate { status, .. } => Some(*status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                JobStatus::Processing,
                JobStatus::Pending,
                JobStatus::Processing,
                JobStatus::Pending,
                JobStatus::Processing
            ]
        );
        assert!(matches!(events.last(), Some(BatchEvent::JobResult { completed: 1, total: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_exhaust_retries() {
        let mut generator = Scripted::new(0);
        generator.hang = true;
        let generator = Arc::new(generator);
        let scheduler = scheduler(generator.clone(), 2, 3);

        let (finished, events) = run(&scheduler, jobs(1)).await;

        let job = &finished[0];
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.retry_count(), 3);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
        assert!(job.error.as_deref().unwrap_or_default().contains("exceeded"));
        assert!(matches!(events.last(), Some(BatchEvent::JobFailed { retry_count: 3, .. })));
        // Every timed-out call released its slot.
        assert_eq!(scheduler.slots.available_permits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_linear() {
        let generator = Arc::new(Scripted::new(2));
        let scheduler = scheduler(generator, 1, 3);
        let start = tokio::time::Instant::now();

        run(&scheduler, jobs(1)).await;

        // Three 200ms calls plus 100ms and 200ms of backoff.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_admission() {
        let generator = Arc::new(Scripted::new(0));
        let scheduler = scheduler(generator.clone(), 1, 3);
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let finished = scheduler
            .run(jobs(4), RunContext::default(), tx, cancel)
            .await;

        let statuses: Vec<_> = finished.iter().map(|j| j.status()).collect();
        assert_eq!(
            statuses,
            vec![JobStatus::Completed, JobStatus::Failed, JobStatus::Pending, JobStatus::Pending]
        );
        assert_eq!(finished[1].error.as_deref(), Some("cancelled"));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.slots.available_permits(), 1);

        let mut results = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, BatchEvent::JobResult { .. }) {
                results += 1;
            }
        }
        assert_eq!(results, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crashed_task_keeps_attempt_history() {
        let scheduler = Scheduler::new(
            Arc::new(FailThenPanic {
                calls: AtomicUsize::new(0),
            }),
            Arc::new(Unlimited),
            Arc::new(Semaphore::new(1)),
            Arc::new(SystemClock),
            SchedulerConfig {
                max_concurrent_jobs: 1,
                job_timeout: Duration::from_secs(5),
                retry: RetryPolicy::new(3, Duration::from_millis(100)),
            },
        );

        let (finished, events) = run(&scheduler, jobs(1)).await;

        let job = &finished[0];
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.retry_count(), 1);
        assert_eq!(job.retry.attempt, 2);
        assert_eq!(job.error.as_deref(), Some("job task crashed"));
        assert_eq!(scheduler.slots.available_permits(), 1);

        let statuses: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::JobUpdate { status, .. } => Some(*status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![JobStatus::Processing, JobStatus::Pending, JobStatus::Processing]
        );
        assert!(matches!(events.last(), Some(BatchEvent::JobFailed { retry_count: 1, .. })));
    }

    #[tokio::test]
    async fn test_reference_prefers_persona_headshot() {
        let persona = PersonaLock {
            age: Default::default(),
            sex: Default::default(),
            ethnicity: "Nordic".to_string(),
            size: Size::M,
            name: "Ingrid".to_string(),
            description: "slim build".to_string(),
            reference_image: Some(GeneratedImage {
                data: vec![1],
                mime_type: "image/png".to_string(),
            }),
        };
        let context = RunContext {
            persona: Some(Arc::new(persona)),
            design_image: Some(Arc::new(vec![2])),
            negative_extra: "",
        };
        assert_eq!(context.reference_image(), Some(&[1u8][..]));

        let design_only = RunContext {
            persona: None,
            ..context
        };
        assert_eq!(design_only.reference_image(), Some(&[2u8][..]));
    }
}
