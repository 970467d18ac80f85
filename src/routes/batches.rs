use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::Stream;
use serde::Serialize;
use std::convert::Infallible;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::app_state::AppState;
use crate::models::batch::BatchRequest;
use crate::models::event::BatchEvent;
use crate::services::coordinator::BatchError;

/// POST /api/v1/mockups/batches: validate a batch and stream its events.
///
/// Each event is sent as SSE with the event type as the SSE event name and the
/// JSON payload as data. Dropping the connection cancels the batch.
pub async fn create_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let cancel = CancellationToken::new();
    let handle = state.coordinator.start_batch(request, cancel.clone())?;

    tracing::info!(
        batch_id = %handle.batch_id,
        jobs = handle.total_jobs,
        "Batch accepted, streaming events"
    );
    metrics::counter!("mockup_batches_total").increment(1);

    let guard = cancel.drop_guard();
    let stream = UnboundedReceiverStream::new(handle.events).map(move |event| {
        let _guard = &guard;
        Ok(to_sse(&event))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &BatchEvent) -> Event {
    match Event::default().event(event.name()).json_data(event) {
        Ok(sse) => sse,
        Err(e) => {
            tracing::error!(event = event.name(), error = %e, "Failed to encode event");
            Event::default().event("error").data("event encoding failed")
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

/// Errors returned before the event stream opens.
#[derive(Debug)]
pub struct ApiError(pub BatchError);

impl From<BatchError> for ApiError {
    fn from(e: BatchError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            BatchError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed"),
            BatchError::PersonaLockFailed { .. } => (StatusCode::BAD_GATEWAY, "persona_lock_failed"),
        };
        tracing::warn!(status = status.as_u16(), error = %self.0, "Batch rejected");
        (
            status,
            Json(ErrorResponse {
                error,
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
