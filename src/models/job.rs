use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::lock::JobLocks;
use crate::models::product::{CameraAngle, Size};
use crate::services::image_api::GeneratedImage;

/// Status of a generation job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// The color/angle/size combination a job renders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobVariant {
    pub color: String,
    pub angle: CameraAngle,
    pub size: Size,
}

/// Retry bookkeeping carried between attempts.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Attempts started so far.
    pub attempt: u32,
    pub last_error: Option<String>,
    pub next_eligible_at: Option<Instant>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Illegal job transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// One image to render: a single color x angle x size combination.
///
/// Status only changes through the transition methods below.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub id: Uuid,
    pub index: usize,
    pub variant: JobVariant,
    pub locks: JobLocks,
    status: JobStatus,
    retry_count: u32,
    pub retry: RetryState,
    pub result: Option<GeneratedImage>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    pub fn new(index: usize, variant: JobVariant, locks: JobLocks) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            index,
            variant,
            locks,
            status: JobStatus::Pending,
            retry_count: 0,
            retry: RetryState::default(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// pending -> processing. Starts a new attempt.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Pending, JobStatus::Processing)?;
        self.retry.attempt += 1;
        self.retry.next_eligible_at = None;
        Ok(())
    }

    /// processing -> completed.
    pub fn complete(&mut self, image: GeneratedImage) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing, JobStatus::Completed)?;
        self.result = Some(image);
        self.error = None;
        Ok(())
    }

    /// processing -> pending after a failed attempt; eligible again after `delay`.
    pub fn requeue(
        &mut self,
        error: impl Into<String>,
        now: Instant,
        delay: Duration,
    ) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing, JobStatus::Pending)?;
        self.retry_count += 1;
        self.retry.last_error = Some(error.into());
        self.retry.next_eligible_at = Some(now + delay);
        Ok(())
    }

    /// processing -> failed after the final failed attempt.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing, JobStatus::Failed)?;
        let error = error.into();
        self.retry_count += 1;
        self.retry.last_error = Some(error.clone());
        self.error = Some(error);
        Ok(())
    }

    /// processing -> failed without consuming a retry; the attempt was cut short
    /// by cancellation or by a crashed task rather than by the upstream.
    pub fn abort(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing, JobStatus::Failed)?;
        self.error = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, from: JobStatus, to: JobStatus) -> Result<(), TransitionError> {
        if self.status != from {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}
