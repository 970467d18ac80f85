use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::batch::CreditUsage;
use crate::models::job::{JobStatus, JobVariant};
use crate::models::persona::PersonaSummary;

/// Why a whole batch was abandoned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchFailureReason {
    PersonaLockFailed,
}

/// Typed progress events, in emission order per job.
///
/// Transport framing (SSE, websockets) belongs to the consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    PersonaReady {
        batch_id: Uuid,
        persona: PersonaSummary,
    },
    JobUpdate {
        job_id: Uuid,
        status: JobStatus,
        retry_count: u32,
        completed: usize,
        total: usize,
    },
    JobResult {
        job_id: Uuid,
        variant: JobVariant,
        #[serde(with = "base64_bytes")]
        image_bytes: Vec<u8>,
        mime_type: String,
        completed: usize,
        total: usize,
    },
    JobFailed {
        job_id: Uuid,
        variant: JobVariant,
        error: String,
        retry_count: u32,
        completed: usize,
        total: usize,
    },
    BatchComplete {
        batch_id: Uuid,
        succeeded: usize,
        failed: usize,
        total: usize,
        credits: CreditUsage,
    },
    BatchFailed {
        batch_id: Uuid,
        reason: BatchFailureReason,
        message: String,
    },
    BatchCancelled {
        batch_id: Uuid,
        succeeded: usize,
        failed: usize,
        pending: usize,
        total: usize,
        credits: CreditUsage,
    },
}

impl BatchEvent {
    /// Event type name, matching the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            BatchEvent::PersonaReady { .. } => "persona_ready",
            BatchEvent::JobUpdate { .. } => "job_update",
            BatchEvent::JobResult { .. } => "job_result",
            BatchEvent::JobFailed { .. } => "job_failed",
            BatchEvent::BatchComplete { .. } => "batch_complete",
            BatchEvent::BatchFailed { .. } => "batch_failed",
            BatchEvent::BatchCancelled { .. } => "batch_cancelled",
        }
    }

    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            BatchEvent::JobUpdate { job_id, .. }
            | BatchEvent::JobResult { job_id, .. }
            | BatchEvent::JobFailed { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchEvent::BatchComplete { .. }
                | BatchEvent::BatchFailed { .. }
                | BatchEvent::BatchCancelled { .. }
        )
    }
}

/// Image bytes travel as base64 strings.
mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persona_failure_wire_shape() {
        let event = BatchEvent::BatchFailed {
            batch_id: Uuid::nil(),
            reason: BatchFailureReason::PersonaLockFailed,
            message: "headshot failed".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "batch_failed");
        assert_eq!(json["reason"], "persona_lock_failed");
        assert_eq!(event.name(), "batch_failed");
        assert!(event.is_terminal());
    }

    #[test]
    fn test_job_result_encodes_image_as_base64() {
        let event = BatchEvent::JobResult {
            job_id: Uuid::nil(),
            variant: JobVariant {
                color: "navy".to_string(),
                angle: crate::models::product::CameraAngle::Front,
                size: crate::models::product::Size::L,
            },
            image_bytes: vec![0x89, 0x50, 0x4E, 0x47],
            mime_type: "image/png".to_string(),
            completed: 1,
            total: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job_result");
        assert_eq!(json["image_bytes"], "iVBORw==");
        assert_eq!(json["variant"]["angle"], "front");
    }
}
