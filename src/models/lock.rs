use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumString};

/// Category a lock pins down in the final prompt.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LockCategory {
    Product,
    Color,
    Camera,
    Lighting,
    Design,
    Persona,
}

/// Immutable, named fragment of generation instructions.
///
/// Built once per distinct value and shared between jobs behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariantLock {
    pub category: LockCategory,
    pub summary: String,
    pub details: BTreeMap<String, String>,
}

impl VariantLock {
    pub fn new(category: LockCategory, summary: impl Into<String>) -> Self {
        Self {
            category,
            summary: summary.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Prompt text for this lock: the summary followed by its details in key order.
    pub fn fragment(&self) -> String {
        if self.details.is_empty() {
            return self.summary.clone();
        }
        let details = self
            .details
            .iter()
            .map(|(k, v)| format!("{}: {}", k.replace('_', " "), v))
            .collect::<Vec<_>>()
            .join("; ");
        format!("{} ({})", self.summary, details)
    }
}

/// The five variant locks every job carries.
#[derive(Debug, Clone)]
pub struct JobLocks {
    pub product: Arc<VariantLock>,
    pub color: Arc<VariantLock>,
    pub camera: Arc<VariantLock>,
    pub lighting: Arc<VariantLock>,
    pub design: Arc<VariantLock>,
}

/// Fully assembled text sent upstream.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CompiledPrompt {
    pub prompt: String,
    pub negative_prompt: String,
}
