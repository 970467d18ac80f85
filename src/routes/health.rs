use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub rate_limiter: RateLimiterHealth,
}

#[derive(Serialize)]
pub struct RateLimiterHealth {
    pub status: String,
    pub limit_per_minute: usize,
    pub in_window: usize,
}

/// GET /health: liveness plus upstream admission headroom.
///
/// A saturated limiter is reported but is not an error; callers just wait longer.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let limit = state.rate_limiter.limit();
    let in_window = state.rate_limiter.in_window();

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            rate_limiter: RateLimiterHealth {
                status: if in_window >= limit {
                    "saturated".to_string()
                } else {
                    "ok".to_string()
                },
                limit_per_minute: limit,
                in_window,
            },
        },
    };

    (StatusCode::OK, Json(response))
}
