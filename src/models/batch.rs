use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::models::job::{GenerationJob, JobStatus};
use crate::models::persona::{PersonaDetails, PersonaLock};
use crate::models::product::{CameraAngle, LightingPreset, MaterialCondition, Size};
use crate::services::catalog;

/// Where the design sits on the product.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DesignPlacement {
    #[default]
    CenterChest,
    LeftChest,
    FullFront,
    FullBack,
    Wraparound,
}

/// The user's design, described for the prompt and optionally attached as an image.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DesignSpec {
    #[garde(length(min = 1, max = 500))]
    pub description: String,

    #[garde(skip)]
    #[serde(default)]
    pub placement: DesignPlacement,

    /// Base64-encoded design artwork, used as the reference image for products
    /// rendered without a model.
    #[garde(length(max = 14_000_000))]
    #[serde(default)]
    pub image_base64: Option<String>,
}

/// Request to render a product design across colors, angles and sizes.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchRequest {
    #[garde(length(min = 1, max = 40))]
    pub product: String,

    #[garde(length(min = 1, max = 20), inner(length(min = 1, max = 40)), custom(distinct_colors))]
    pub colors: Vec<String>,

    #[garde(length(min = 1, max = 6), custom(distinct))]
    pub angles: Vec<CameraAngle>,

    #[garde(length(min = 1, max = 8), custom(distinct))]
    pub sizes: Vec<Size>,

    #[garde(length(min = 1, max = 40))]
    #[serde(default = "default_style")]
    pub style: String,

    #[garde(skip)]
    #[serde(default)]
    pub lighting: LightingPreset,

    #[garde(skip)]
    #[serde(default)]
    pub material: MaterialCondition,

    #[garde(dive)]
    pub design: DesignSpec,

    /// Required when the product is worn by a model.
    #[garde(dive)]
    #[serde(default)]
    pub persona: Option<PersonaDetails>,

    /// Fixes the sampled persona so a batch can be reproduced.
    #[garde(skip)]
    #[serde(default)]
    pub persona_seed: Option<u64>,

    /// Credits the billing layer already reserved for this batch.
    #[garde(skip)]
    pub reserved_credits: u32,
}

fn default_style() -> String {
    "studio".to_string()
}

#[allow(clippy::ptr_arg)]
fn distinct<T: PartialEq>(value: &Vec<T>, _ctx: &()) -> garde::Result {
    for (i, item) in value.iter().enumerate() {
        if value[..i].contains(item) {
            return Err(garde::Error::new("duplicate entries are not allowed"));
        }
    }
    Ok(())
}

/// Colors that differ only in case or surrounding whitespace render identically.
#[allow(clippy::ptr_arg)]
fn distinct_colors(value: &Vec<String>, ctx: &()) -> garde::Result {
    let normalized: Vec<String> = value.iter().map(|c| catalog::normalize_color(c)).collect();
    distinct(&normalized, ctx)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// Signal for the billing collaborator: how many of the requested images exist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreditUsage {
    pub requested: u32,
    pub succeeded: u32,
}

impl CreditUsage {
    pub fn refundable(&self) -> u32 {
        self.requested.saturating_sub(self.succeeded)
    }
}

/// Aggregate root for one batch run.
#[derive(Debug, Clone)]
pub struct MockupBatch {
    pub id: Uuid,
    pub status: BatchStatus,
    pub jobs: Vec<GenerationJob>,
    pub persona_lock: Option<Arc<PersonaLock>>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl MockupBatch {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            status: BatchStatus::Pending,
            jobs: Vec::new(),
            persona_lock: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(JobStatus::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(JobStatus::Failed)
    }

    pub fn pending(&self) -> usize {
        self.count(JobStatus::Pending)
    }

    pub fn credits(&self) -> CreditUsage {
        CreditUsage {
            requested: self.total() as u32,
            succeeded: self.succeeded() as u32,
        }
    }

    fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status() == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BatchRequest {
        serde_json::from_value(serde_json::json!({
            "product": "t_shirt",
            "colors": ["black", "white"],
            "angles": ["front", "back"],
            "sizes": ["m"],
            "design": { "description": "retro sunset logo" },
            "persona": { "ethnicity": "East Asian" },
            "reserved_credits": 4
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let req = request();
        assert_eq!(req.style, "studio");
        assert_eq!(req.lighting, LightingPreset::Softbox);
        assert_eq!(req.design.placement, DesignPlacement::CenterChest);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_duplicate_colors_rejected() {
        let mut req = request();
        req.colors = vec!["black".to_string(), "black".to_string()];
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_case_variant_colors_rejected() {
        let mut req = request();
        req.colors = vec!["Black".to_string(), " black ".to_string()];
        assert!(req.validate().is_err());

        req.colors = vec!["#1a1a1a".to_string(), "#1A1A1A".to_string()];
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_empty_dimension_rejected() {
        let mut req = request();
        req.angles.clear();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_credit_refund() {
        let usage = CreditUsage {
            requested: 10,
            succeeded: 8,
        };
        assert_eq!(usage.refundable(), 2);
    }
}
