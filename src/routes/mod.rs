use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod batches;
pub mod health;
pub mod metrics;

/// API routes. `/metrics` is mounted separately since it needs the recorder handle.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/mockups/batches", post(batches::create_batch))
        .with_state(state)
}
