//! Lock compilation.
//!
//! Turns catalog keys into immutable `VariantLock`s and assembles them into the
//! prompt pair sent upstream. Everything here is pure: identical inputs give
//! byte-identical prompts.

use std::sync::Arc;

use crate::models::batch::{DesignPlacement, DesignSpec};
use crate::models::lock::{CompiledPrompt, JobLocks, LockCategory, VariantLock};
use crate::models::persona::PersonaLock;
use crate::models::product::{CameraAngle, LightingPreset, MaterialCondition, ProductKind, Size, StyleKey};
use crate::services::catalog::{self, CatalogMode, ProductSpec, UnknownKey};

const QUALITY_SUFFIX: &str =
    "photorealistic product photography, sharp focus, true-to-life colors, 8k detail";

const BASE_NEGATIVE: &str = "blurry, low resolution, watermark, text artifacts, distorted print, \
    misaligned design, extra limbs, deformed hands, cartoon, illustration, cgi";

const PERSONA_NEGATIVE: &str = "different person, inconsistent face, changing hairstyle";

/// Batch-wide inputs to lock compilation.
#[derive(Debug, Clone)]
pub struct LockInputs<'a> {
    pub product: &'a str,
    pub style: &'a str,
    pub lighting: LightingPreset,
    pub material: MaterialCondition,
    pub design: &'a DesignSpec,
}

/// Locks that every job in a batch shares.
#[derive(Debug, Clone)]
pub struct SharedLocks {
    pub product_kind: ProductKind,
    pub product: Arc<VariantLock>,
    pub lighting: Arc<VariantLock>,
    pub design: Arc<VariantLock>,
}

impl SharedLocks {
    pub fn requires_persona(&self) -> bool {
        catalog::product_spec(self.product_kind).worn_by_model
    }
}

/// Compiles locks under a fixed catalog mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockCompiler {
    mode: CatalogMode,
}

impl LockCompiler {
    pub fn new(mode: CatalogMode) -> Self {
        Self { mode }
    }

    /// Build the product, lighting and design locks for a batch.
    pub fn compile_shared(&self, inputs: &LockInputs<'_>) -> Result<SharedLocks, LockError> {
        let kind = catalog::resolve_product(inputs.product, self.mode)?;
        let style = catalog::resolve_style(inputs.style, self.mode)?;
        let spec = catalog::product_spec(kind);

        Ok(SharedLocks {
            product_kind: kind,
            product: Arc::new(product_lock(spec, inputs.material)),
            lighting: Arc::new(lighting_lock(inputs.lighting, style)),
            design: Arc::new(design_lock(spec, inputs.design)),
        })
    }

    pub fn color_lock(&self, color: &str) -> VariantLock {
        let (hex, description) = catalog::color_description(color);
        let lock = VariantLock::new(LockCategory::Color, format!("product color: {}", description));
        match hex {
            Some(hex) => lock.with_detail("hex", hex),
            None => lock,
        }
    }

    pub fn camera_lock(&self, angle: CameraAngle) -> VariantLock {
        VariantLock::new(LockCategory::Camera, catalog::camera_fragment(angle))
            .with_detail("angle", angle.as_ref())
    }
}

fn product_lock(spec: &ProductSpec, material: MaterialCondition) -> VariantLock {
    VariantLock::new(LockCategory::Product, spec.display_name)
        .with_detail("construction", spec.construction)
        .with_detail("material", spec.fabric)
        .with_detail("condition", catalog::material_fragment(material))
}

fn lighting_lock(preset: LightingPreset, style: StyleKey) -> VariantLock {
    VariantLock::new(LockCategory::Lighting, catalog::lighting_fragment(preset))
        .with_detail("scene", catalog::style_fragment(style))
}

fn design_lock(spec: &ProductSpec, design: &DesignSpec) -> VariantLock {
    VariantLock::new(
        LockCategory::Design,
        format!("printed design: {}", design.description.trim()),
    )
    .with_detail("placement", placement_fragment(design.placement))
    .with_detail("print_area", spec.print_area)
}

fn placement_fragment(placement: DesignPlacement) -> &'static str {
    match placement {
        DesignPlacement::CenterChest => "centered on the chest",
        DesignPlacement::LeftChest => "small on the left chest",
        DesignPlacement::FullFront => "large across the full front",
        DesignPlacement::FullBack => "large across the full back",
        DesignPlacement::Wraparound => "wrapped around the product surface",
    }
}

/// Assemble the prompt for one job. Section order is fixed.
pub fn compile_prompt(
    locks: &JobLocks,
    persona: Option<&PersonaLock>,
    size: Size,
    negative_extra: &str,
) -> CompiledPrompt {
    let mut sections = Vec::with_capacity(8);

    match persona {
        Some(persona) => sections.push(format!(
            "{} wearing a {} in size {}",
            persona.as_variant_lock().fragment(),
            locks.product.summary,
            size.tag()
        )),
        None => sections.push(format!("a {}", locks.product.summary)),
    }
    sections.push(locks.product.fragment());
    sections.push(locks.color.fragment());
    sections.push(locks.design.fragment());
    sections.push(locks.camera.fragment());
    sections.push(locks.lighting.fragment());
    sections.push(QUALITY_SUFFIX.to_string());

    let mut negative = vec![BASE_NEGATIVE];
    if persona.is_some() {
        negative.push(PERSONA_NEGATIVE);
    }
    if !negative_extra.is_empty() {
        negative.push(negative_extra);
    }

    CompiledPrompt {
        prompt: sections.join(". "),
        negative_prompt: negative.join(", "),
    }
}

/// Product-specific terms to keep out of the image.
pub fn product_negative(kind: ProductKind) -> &'static str {
    catalog::product_spec(kind).negative
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LockError {
    #[error(transparent)]
    UnknownKey(#[from] UnknownKey),
}
