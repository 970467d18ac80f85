//! Product, scene and palette reference data.
//!
//! Read-only, in-memory tables that turn catalog keys into prompt fragments.
//! Nothing here performs I/O.

use std::str::FromStr;

use crate::models::product::{CameraAngle, LightingPreset, MaterialCondition, ProductKind, StyleKey};

/// Fallback product when a lenient lookup misses.
pub const DEFAULT_PRODUCT: ProductKind = ProductKind::TShirt;

/// Fallback style when a lenient lookup misses.
pub const DEFAULT_STYLE: StyleKey = StyleKey::Studio;

/// How unknown catalog keys are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogMode {
    /// Unknown keys are errors.
    Strict,
    /// Unknown keys fall back to `DEFAULT_PRODUCT` / `DEFAULT_STYLE` with a warning.
    Lenient,
}

impl Default for CatalogMode {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            CatalogMode::Strict
        } else {
            CatalogMode::Lenient
        }
    }
}

// ── Products ────────────────────────────────────────────────────────────

/// Construction details for one product.
#[derive(Debug, Clone, Copy)]
pub struct ProductSpec {
    pub kind: ProductKind,
    pub display_name: &'static str,
    pub construction: &'static str,
    pub fabric: &'static str,
    pub print_area: &'static str,
    /// Rendered on a human model, so the batch needs a persona.
    pub worn_by_model: bool,
    pub negative: &'static str,
}

pub const PRODUCTS: &[ProductSpec] = &[
    ProductSpec {
        kind: ProductKind::TShirt,
        display_name: "crew neck t-shirt",
        construction: "short sleeves, ribbed crew collar, double-needle hems, relaxed fit",
        fabric: "180gsm combed cotton jersey with natural drape and soft folds",
        print_area: "12 x 16 inch front print area",
        worn_by_model: true,
        negative: "v-neck, collar buttons, pocket",
    },
    ProductSpec {
        kind: ProductKind::Hoodie,
        display_name: "pullover hoodie",
        construction: "lined hood with drawcords, kangaroo pocket, ribbed cuffs and waistband",
        fabric: "heavyweight cotton-poly fleece with brushed interior",
        print_area: "12 x 12 inch front print area above the pocket",
        worn_by_model: true,
        negative: "zipper, missing hood",
    },
    ProductSpec {
        kind: ProductKind::TankTop,
        display_name: "tank top",
        construction: "sleeveless, scoop neck, wide shoulder straps",
        fabric: "lightweight ring-spun cotton jersey",
        print_area: "10 x 14 inch front print area",
        worn_by_model: true,
        negative: "sleeves, collar",
    },
    ProductSpec {
        kind: ProductKind::LongSleeve,
        display_name: "long sleeve t-shirt",
        construction: "set-in long sleeves, rib-knit cuffs, crew neck",
        fabric: "midweight cotton jersey",
        print_area: "12 x 16 inch front print area",
        worn_by_model: true,
        negative: "short sleeves, hood",
    },
    ProductSpec {
        kind: ProductKind::Sweatshirt,
        display_name: "crewneck sweatshirt",
        construction: "raglan sleeves, ribbed collar, cuffs and hem",
        fabric: "midweight fleece with a matte finish",
        print_area: "12 x 12 inch front print area",
        worn_by_model: true,
        negative: "hood, zipper, pocket",
    },
    ProductSpec {
        kind: ProductKind::ToteBag,
        display_name: "canvas tote bag",
        construction: "flat body, two long shoulder handles, reinforced stitching",
        fabric: "12oz natural cotton canvas",
        print_area: "10 x 10 inch centered print area",
        worn_by_model: false,
        negative: "zipper, leather trim",
    },
    ProductSpec {
        kind: ProductKind::Mug,
        display_name: "ceramic coffee mug",
        construction: "11oz cylindrical body, C-shaped handle, rounded rim",
        fabric: "glossy glazed ceramic with subtle reflections",
        print_area: "wraparound print area between handle sides",
        worn_by_model: false,
        negative: "chipped rim, second handle, liquid spill",
    },
    ProductSpec {
        kind: ProductKind::Poster,
        display_name: "framed art poster",
        construction: "18 x 24 inch print in a thin black frame with white mat",
        fabric: "matte archival paper with fine grain",
        print_area: "full bleed within the mat",
        worn_by_model: false,
        negative: "glare, warped frame, crooked hanging",
    },
    ProductSpec {
        kind: ProductKind::PhoneCase,
        display_name: "slim phone case",
        construction: "one-piece snap case with camera cutout and raised bezel",
        fabric: "glossy polycarbonate shell",
        print_area: "full back print area around the camera cutout",
        worn_by_model: false,
        negative: "cracked case, extra camera lenses",
    },
    ProductSpec {
        kind: ProductKind::Cap,
        display_name: "six panel baseball cap",
        construction: "structured front panels, curved brim, adjustable strap",
        fabric: "cotton twill with embroidered finish",
        print_area: "4 x 2 inch embroidered front panel",
        worn_by_model: true,
        negative: "flat brim, mesh back",
    },
];

pub fn product_spec(kind: ProductKind) -> &'static ProductSpec {
    PRODUCTS
        .iter()
        .find(|p| p.kind == kind)
        .unwrap_or(&PRODUCTS[0])
}

/// Look up a product key such as `"t_shirt"`.
pub fn resolve_product(key: &str, mode: CatalogMode) -> Result<ProductKind, UnknownKey> {
    resolve(key, "product", DEFAULT_PRODUCT, mode)
}

// ── Scene ───────────────────────────────────────────────────────────────

pub fn resolve_style(key: &str, mode: CatalogMode) -> Result<StyleKey, UnknownKey> {
    resolve(key, "style", DEFAULT_STYLE, mode)
}

pub fn style_fragment(style: StyleKey) -> &'static str {
    match style {
        StyleKey::Studio => "seamless light grey studio backdrop, clean e-commerce composition",
        StyleKey::Lifestyle => "bright apartment interior with natural props, candid lifestyle feel",
        StyleKey::Streetwear => "urban street setting with concrete and murals, editorial streetwear look",
        StyleKey::Minimal => "plain off-white background, minimal composition with generous negative space",
        StyleKey::Editorial => "high fashion editorial set with sculptural backdrop",
    }
}

pub fn camera_fragment(angle: CameraAngle) -> &'static str {
    match angle {
        CameraAngle::Front => "straight-on front view, eye level, 85mm lens",
        CameraAngle::Back => "rear view showing the back of the product, eye level, 85mm lens",
        CameraAngle::Side => "side profile view, 85mm lens",
        CameraAngle::ThreeQuarter => "three-quarter view turned 45 degrees, 85mm lens",
        CameraAngle::CloseUp => "close-up detail shot of the print, 100mm macro lens",
        CameraAngle::FlatLay => "top-down flat lay, product laid flat, 50mm lens",
    }
}

pub fn lighting_fragment(preset: LightingPreset) -> &'static str {
    match preset {
        LightingPreset::Softbox => "large softbox key light with fill, soft even shadows, 5500K",
        LightingPreset::Natural => "diffused window daylight, gentle falloff",
        LightingPreset::GoldenHour => "warm low-angle golden hour sunlight, long soft shadows",
        LightingPreset::Dramatic => "hard single key light with deep shadows and rim light",
    }
}

pub fn material_fragment(condition: MaterialCondition) -> &'static str {
    match condition {
        MaterialCondition::New => "brand new, crisp and clean",
        MaterialCondition::Worn => "lightly worn with natural creases",
        MaterialCondition::VintageWashed => "vintage garment-dyed wash with slightly faded print",
    }
}

// ── Palette ─────────────────────────────────────────────────────────────

/// Named colors with the description the model renders best.
pub const PALETTE: &[(&str, &str, &str)] = &[
    ("black", "#1A1A1A", "deep jet black"),
    ("white", "#F7F7F5", "bright optic white"),
    ("heather grey", "#A6A6A6", "heather grey marl"),
    ("navy", "#1F2A44", "dark navy blue"),
    ("red", "#B3202A", "true red"),
    ("royal blue", "#2A4DA8", "saturated royal blue"),
    ("forest green", "#2F4F3A", "deep forest green"),
    ("maroon", "#5C1F2A", "dark maroon"),
    ("sand", "#D8C8A8", "warm sand beige"),
    ("pink", "#F2B8C6", "soft pastel pink"),
    ("yellow", "#F2C94C", "sunflower yellow"),
    ("orange", "#E8772E", "burnt orange"),
    ("purple", "#5B3F8C", "deep purple"),
    ("olive", "#6B6B3A", "muted olive"),
];

/// Key under which two color entries name the same color.
pub fn normalize_color(color: &str) -> String {
    color.trim().to_lowercase()
}

/// Returns `(hex, description)` for a color name or hex code.
///
/// Unlisted names are used verbatim.
pub fn color_description(color: &str) -> (Option<String>, String) {
    let normalized = normalize_color(color);
    if let Some((_, hex, desc)) = PALETTE.iter().find(|(name, _, _)| *name == normalized) {
        return (Some((*hex).to_string()), (*desc).to_string());
    }
    if is_hex_color(&normalized) {
        return (Some(normalized.to_uppercase()), format!("custom color {}", normalized.to_uppercase()));
    }
    (None, color.trim().to_string())
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

// ── Lookup ──────────────────────────────────────────────────────────────

fn resolve<T: FromStr + Copy + std::fmt::Display>(
    key: &str,
    kind: &'static str,
    fallback: T,
    mode: CatalogMode,
) -> Result<T, UnknownKey> {
    let normalized = key.trim().to_lowercase().replace(['-', ' '], "_");
    match T::from_str(&normalized) {
        Ok(value) => Ok(value),
        Err(_) => match mode {
            CatalogMode::Strict => Err(UnknownKey {
                kind,
                key: key.to_string(),
            }),
            CatalogMode::Lenient => {
                tracing::warn!(kind, key = %key, fallback = %fallback, "Unknown catalog key, using default");
                Ok(fallback)
            }
        },
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Unknown {kind} key '{key}'")]
pub struct UnknownKey {
    pub kind: &'static str,
    pub key: String,
}
