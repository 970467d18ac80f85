//! Sample batch requests shared by the integration tests.

use mockup_studio::models::batch::BatchRequest;
use serde_json::json;

/// Apparel worn by the persona: black and white tees, front view, size M.
pub fn two_color_tee() -> BatchRequest {
    parse(json!({
        "product": "t_shirt",
        "colors": ["black", "white"],
        "angles": ["front"],
        "sizes": ["m"],
        "style": "studio",
        "design": { "description": "minimal mountain line art", "placement": "center_chest" },
        "persona": { "age": "25_34", "sex": "female", "ethnicity": "East Asian", "size": "m" },
        "persona_seed": 11,
        "reserved_credits": 2
    }))
}

/// One hoodie variant; a single job.
pub fn single_hoodie() -> BatchRequest {
    parse(json!({
        "product": "hoodie",
        "colors": ["heather grey"],
        "angles": ["three_quarter"],
        "sizes": ["l"],
        "style": "streetwear",
        "lighting": "golden_hour",
        "design": { "description": "graffiti tag logo", "placement": "full_back" },
        "persona": { "age": "18_24", "sex": "male", "ethnicity": "Latino", "size": "l" },
        "reserved_credits": 1
    }))
}

/// Four sweatshirt jobs: two colors by two angles.
pub fn four_job_sweatshirt() -> BatchRequest {
    parse(json!({
        "product": "sweatshirt",
        "colors": ["navy", "#2E8B57"],
        "angles": ["front", "back"],
        "sizes": ["s"],
        "design": { "description": "varsity lettering" },
        "persona": { "age": "35_44", "sex": "female", "ethnicity": "Nordic", "size": "s" },
        "reserved_credits": 4
    }))
}

/// Product without a model, so no persona is generated.
pub fn mug_pair() -> BatchRequest {
    parse(json!({
        "product": "mug",
        "colors": ["white", "black"],
        "angles": ["side"],
        "sizes": ["one_size"],
        "style": "lifestyle",
        "design": { "description": "hand-lettered good morning" },
        "reserved_credits": 2
    }))
}

/// Three colors by two angles by two sizes.
pub fn twelve_job_tank() -> BatchRequest {
    parse(json!({
        "product": "tank_top",
        "colors": ["black", "white", "red"],
        "angles": ["front", "side"],
        "sizes": ["s", "xl"],
        "design": { "description": "palm tree silhouette" },
        "persona": { "age": "45_54", "sex": "male", "ethnicity": "Mediterranean", "size": "xl" },
        "reserved_credits": 12
    }))
}

pub fn parse(value: serde_json::Value) -> BatchRequest {
    serde_json::from_value(value).expect("fixture must deserialize")
}
