//! Batch lifecycle: validate, lock the persona, run jobs, aggregate.
//!
//! The coordinator is the single place that decides whether a batch
//! succeeded. A failed persona lock aborts the batch before any job runs and
//! is reported as its own failure, never folded into per-job failures.

use base64::Engine;
use garde::Validate;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::batch::{BatchRequest, BatchStatus, MockupBatch};
use crate::models::event::{BatchEvent, BatchFailureReason};
use crate::models::persona::{PersonaDetails, PersonaSummary};
use crate::services::catalog::CatalogMode;
use crate::services::clock::Clock;
use crate::services::image_api::ImageGenerator;
use crate::services::job_builder::{BuildError, JobQueueBuilder};
use crate::services::locks::{product_negative, LockCompiler, LockError, LockInputs, SharedLocks};
use crate::services::persona::{PersonaError, PersonaLockGenerator};
use crate::services::rate_limit::RateLimiter;
use crate::services::scheduler::{EventSink, RunContext, Scheduler, SchedulerConfig};

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    pub scheduler: SchedulerConfig,
    pub max_batch_jobs: usize,
    pub persona_headshot: bool,
    pub catalog_mode: CatalogMode,
}

impl CoordinatorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            scheduler: config.scheduler_config(),
            max_batch_jobs: config.max_batch_jobs,
            persona_headshot: config.persona_headshot,
            catalog_mode: config.catalog_mode(),
        }
    }
}

/// A batch running in the background.
pub struct BatchHandle {
    pub batch_id: Uuid,
    pub total_jobs: usize,
    pub events: mpsc::UnboundedReceiver<BatchEvent>,
    pub outcome: JoinHandle<Result<MockupBatch, BatchError>>,
}

/// A validated batch whose jobs are built but not started.
struct PreparedBatch {
    batch: MockupBatch,
    shared: SharedLocks,
    persona: Option<(PersonaDetails, Option<u64>)>,
    design_image: Option<Arc<Vec<u8>>>,
}

#[derive(Clone)]
pub struct BatchCoordinator {
    generator: Arc<dyn ImageGenerator>,
    rate_limiter: Arc<dyn RateLimiter>,
    clock: Arc<dyn Clock>,
    settings: CoordinatorSettings,
}

impl BatchCoordinator {
    /// `rate_limiter` is shared by every batch this coordinator runs.
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        rate_limiter: Arc<dyn RateLimiter>,
        clock: Arc<dyn Clock>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            generator,
            rate_limiter,
            clock,
            settings,
        }
    }

    /// Validate synchronously, then run the batch in a background task.
    pub fn start_batch(
        &self,
        request: BatchRequest,
        cancel: CancellationToken,
    ) -> Result<BatchHandle, BatchError> {
        let prepared = self.prepare(&request)?;
        let batch_id = prepared.batch.id;
        let total_jobs = prepared.batch.total();
        let (tx, rx) = mpsc::unbounded_channel();

        let coordinator = self.clone();
        let outcome = tokio::spawn(async move { coordinator.execute(prepared, tx, cancel).await });

        Ok(BatchHandle {
            batch_id,
            total_jobs,
            events: rx,
            outcome,
        })
    }

    /// Run a batch to completion, pushing every event into `events`.
    pub async fn run_batch(
        &self,
        request: &BatchRequest,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<MockupBatch, BatchError> {
        let prepared = self.prepare(request)?;
        self.execute(prepared, events, cancel).await
    }

    fn prepare(&self, request: &BatchRequest) -> Result<PreparedBatch, BatchError> {
        request
            .validate()
            .map_err(|report| BatchError::Validation(report.to_string()))?;

        let compiler = LockCompiler::new(self.settings.catalog_mode);
        let builder = JobQueueBuilder::new(compiler, self.settings.max_batch_jobs);
        let total = builder.check_bounds(&request.colors, &request.angles, &request.sizes)?;

        if (request.reserved_credits as usize) < total {
            return Err(BatchError::Validation(format!(
                "Batch needs {} credits but only {} were reserved",
                total, request.reserved_credits
            )));
        }

        let shared = compiler.compile_shared(&LockInputs {
            product: &request.product,
            style: &request.style,
            lighting: request.lighting,
            material: request.material,
            design: &request.design,
        })?;

        let persona = if shared.requires_persona() {
            let details = request.persona.clone().ok_or_else(|| {
                BatchError::Validation(format!(
                    "Persona details are required for product '{}'",
                    request.product
                ))
            })?;
            Some((details, request.persona_seed))
        } else {
            None
        };

        let design_image = match request.design.image_base64.as_deref() {
            Some(encoded) => Some(Arc::new(
                base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| BatchError::Validation(format!("Design image is not valid base64: {}", e)))?,
            )),
            None => None,
        };

        let jobs = builder.build(&request.colors, &request.angles, &request.sizes, &shared)?;

        let mut batch = MockupBatch::new(Uuid::new_v4());
        batch.jobs = jobs;

        Ok(PreparedBatch {
            batch,
            shared,
            persona,
            design_image,
        })
    }

    async fn execute(
        &self,
        prepared: PreparedBatch,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<MockupBatch, BatchError> {
        let PreparedBatch {
            mut batch,
            shared,
            persona,
            design_image,
        } = prepared;
        batch.status = BatchStatus::Processing;

        tracing::info!(
            batch_id = %batch.id,
            product = %shared.product_kind,
            jobs = batch.total(),
            persona = persona.is_some(),
            "Batch started"
        );

        if let Some((details, seed)) = persona {
            let generator = PersonaLockGenerator::new(
                Arc::clone(&self.generator),
                Arc::clone(&self.rate_limiter),
                self.settings.scheduler.retry,
                self.settings.scheduler.job_timeout,
            );

            match generator
                .lock_for(&details, seed, self.settings.persona_headshot, &cancel)
                .await
            {
                Ok(lock) => {
                    let lock = Arc::new(lock);
                    send(
                        &events,
                        BatchEvent::PersonaReady {
                            batch_id: batch.id,
                            persona: PersonaSummary::from(lock.as_ref()),
                        },
                    );
                    batch.persona_lock = Some(lock);
                }
                Err(PersonaError::Cancelled) => return Ok(self.finish_cancelled(batch, &events)),
                Err(e @ PersonaError::LockFailed { .. }) => {
                    tracing::error!(batch_id = %batch.id, error = %e, "Persona lock failed, batch aborted");
                    batch.status = BatchStatus::Failed;
                    batch.finished_at = Some(chrono::Utc::now());
                    send(
                        &events,
                        BatchEvent::BatchFailed {
                            batch_id: batch.id,
                            reason: BatchFailureReason::PersonaLockFailed,
                            message: e.to_string(),
                        },
                    );
                    return Err(BatchError::PersonaLockFailed {
                        batch_id: batch.id,
                        message: e.to_string(),
                    });
                }
            }
        }

        let scheduler = Scheduler::new(
            Arc::clone(&self.generator),
            Arc::clone(&self.rate_limiter),
            Arc::new(Semaphore::new(self.settings.scheduler.max_concurrent_jobs)),
            Arc::clone(&self.clock),
            self.settings.scheduler,
        );
        let context = RunContext {
            persona: batch.persona_lock.clone(),
            design_image,
            negative_extra: product_negative(shared.product_kind),
        };

        let jobs = std::mem::take(&mut batch.jobs);
        batch.jobs = scheduler.run(jobs, context, events.clone(), cancel.clone()).await;

        if cancel.is_cancelled() {
            return Ok(self.finish_cancelled(batch, &events));
        }

        let succeeded = batch.succeeded();
        batch.status = if succeeded > 0 {
            BatchStatus::Completed
        } else {
            BatchStatus::Failed
        };
        batch.finished_at = Some(chrono::Utc::now());

        tracing::info!(
            batch_id = %batch.id,
            succeeded,
            failed = batch.failed(),
            total = batch.total(),
            status = ?batch.status,
            "Batch finished"
        );

        send(
            &events,
            BatchEvent::BatchComplete {
                batch_id: batch.id,
                succeeded,
                failed: batch.failed(),
                total: batch.total(),
                credits: batch.credits(),
            },
        );
        Ok(batch)
    }

    fn finish_cancelled(&self, mut batch: MockupBatch, events: &EventSink) -> MockupBatch {
        batch.status = BatchStatus::Cancelled;
        batch.finished_at = Some(chrono::Utc::now());
        tracing::info!(
            batch_id = %batch.id,
            succeeded = batch.succeeded(),
            pending = batch.pending(),
            "Batch cancelled"
        );
        send(
            events,
            BatchEvent::BatchCancelled {
                batch_id: batch.id,
                succeeded: batch.succeeded(),
                failed: batch.failed(),
                pending: batch.pending(),
                total: batch.total(),
                credits: batch.credits(),
            },
        );
        batch
    }
}

fn send(events: &EventSink, event: BatchEvent) {
    if events.send(event).is_err() {
        tracing::debug!("Event receiver dropped, event discarded");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Invalid batch request: {0}")]
    Validation(String),

    #[error("Persona lock failed for batch {batch_id}: {message}")]
    PersonaLockFailed { batch_id: Uuid, message: String },
}

impl From<BuildError> for BatchError {
    fn from(e: BuildError) -> Self {
        BatchError::Validation(e.to_string())
    }
}

impl From<LockError> for BatchError {
    fn from(e: LockError) -> Self {
        BatchError::Validation(e.to_string())
    }
}
