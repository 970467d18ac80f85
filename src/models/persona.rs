use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::models::lock::{LockCategory, VariantLock};
use crate::models::product::Size;
use crate::services::image_api::GeneratedImage;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgeBand {
    #[serde(rename = "18_24")]
    #[strum(serialize = "18_24")]
    Age18To24,
    #[default]
    #[serde(rename = "25_34")]
    #[strum(serialize = "25_34")]
    Age25To34,
    #[serde(rename = "35_44")]
    #[strum(serialize = "35_44")]
    Age35To44,
    #[serde(rename = "45_54")]
    #[strum(serialize = "45_54")]
    Age45To54,
    #[serde(rename = "55_plus")]
    #[strum(serialize = "55_plus")]
    Age55Plus,
}

impl AgeBand {
    pub fn describe(&self) -> &'static str {
        match self {
            AgeBand::Age18To24 => "early twenties",
            AgeBand::Age25To34 => "late twenties to early thirties",
            AgeBand::Age35To44 => "late thirties",
            AgeBand::Age45To54 => "late forties",
            AgeBand::Age55Plus => "late fifties",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Sex {
    #[default]
    Female,
    Male,
}

/// Demographic inputs for the virtual model.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PersonaDetails {
    #[garde(skip)]
    #[serde(default)]
    pub age: AgeBand,

    #[garde(skip)]
    #[serde(default)]
    pub sex: Sex,

    #[garde(length(min = 1, max = 60))]
    pub ethnicity: String,

    #[garde(skip)]
    #[serde(default)]
    pub size: Size,
}

/// The virtual model shared by every job of a batch.
///
/// Read-only once published; jobs reference it through an `Arc`.
#[derive(Debug, Clone, Serialize)]
pub struct PersonaLock {
    pub age: AgeBand,
    pub sex: Sex,
    pub ethnicity: String,
    pub size: Size,
    pub name: String,
    pub description: String,
    #[serde(skip)]
    pub reference_image: Option<GeneratedImage>,
}

impl PersonaLock {
    pub fn has_reference_image(&self) -> bool {
        self.reference_image.is_some()
    }

    pub fn reference_bytes(&self) -> Option<&[u8]> {
        self.reference_image.as_ref().map(|img| img.data.as_slice())
    }

    pub fn as_variant_lock(&self) -> VariantLock {
        VariantLock::new(LockCategory::Persona, format!("the same model, {}", self.name))
            .with_detail("age", self.age.describe())
            .with_detail("build", self.description.clone())
            .with_detail("ethnicity", self.ethnicity.clone())
            .with_detail("wears_size", self.size.tag())
    }
}

/// Persona fields safe to put on the event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaSummary {
    pub name: String,
    pub description: String,
    pub has_reference_image: bool,
}

impl From<&PersonaLock> for PersonaSummary {
    fn from(lock: &PersonaLock) -> Self {
        Self {
            name: lock.name.clone(),
            description: lock.description.clone(),
            has_reference_image: lock.has_reference_image(),
        }
    }
}
