use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Products the catalog knows how to render.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, EnumString, EnumIter, Display, AsRefStr, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductKind {
    TShirt,
    Hoodie,
    TankTop,
    LongSleeve,
    Sweatshirt,
    ToteBag,
    Mug,
    Poster,
    PhoneCase,
    Cap,
}

/// Scene styles; each maps to an environment fragment.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, EnumString, EnumIter, Display, AsRefStr, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StyleKey {
    Studio,
    Lifestyle,
    Streetwear,
    Minimal,
    Editorial,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, EnumString, EnumIter, Display, AsRefStr, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CameraAngle {
    Front,
    Back,
    Side,
    ThreeQuarter,
    CloseUp,
    FlatLay,
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, EnumIter, Display, AsRefStr, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LightingPreset {
    #[default]
    Softbox,
    Natural,
    GoldenHour,
    Dramatic,
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, EnumIter, Display, AsRefStr, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MaterialCondition {
    #[default]
    New,
    Worn,
    VintageWashed,
}

/// Garment size label. `OneSize` covers non-apparel products.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, EnumIter, Display, AsRefStr, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Size {
    Xs,
    S,
    #[default]
    M,
    L,
    Xl,
    Xxl,
    Xxxl,
    OneSize,
}

impl Size {
    /// Label as printed on a garment tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Size::Xs => "XS",
            Size::S => "S",
            Size::M => "M",
            Size::L => "L",
            Size::Xl => "XL",
            Size::Xxl => "2XL",
            Size::Xxxl => "3XL",
            Size::OneSize => "one size",
        }
    }
}
