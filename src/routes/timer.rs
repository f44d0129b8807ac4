use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tracing::debug;

use crate::{
    dto::{
        provider::{IngestResponse, RawProviderEvent},
        timer::TimerSnapshot,
    },
    services::timer_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/state",
    tag = "timer",
    responses((status = 200, description = "Current timer snapshot", body = TimerSnapshot))
)]
/// Return the current timer snapshot.
pub async fn current_state(State(state): State<SharedState>) -> Json<TimerSnapshot> {
    let snapshot = state.snapshot().await;
    Json(TimerSnapshot::from(&snapshot))
}

#[utoipa::path(
    post,
    path = "/provider/events",
    tag = "timer",
    request_body(content = String, description = "Raw provider event", content_type = "application/json"),
    responses((status = 202, description = "Event accepted", body = IngestResponse))
)]
/// Feed a provider event through ingestion, as if it arrived on the alert socket.
///
/// Undecodable bodies are accepted and ignored, like any other event that does not count.
pub async fn ingest_event(
    State(state): State<SharedState>,
    body: Bytes,
) -> (StatusCode, Json<IngestResponse>) {
    let applied = match serde_json::from_slice::<RawProviderEvent>(&body) {
        Ok(event) => timer_service::ingest_provider_event(&state, &event).await,
        Err(err) => {
            debug!(error = %err, "ignoring undecodable provider event");
            false
        }
    };
    (StatusCode::ACCEPTED, Json(IngestResponse { applied }))
}

/// Configure the timer routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/state", get(current_state))
        .route("/provider/events", post(ingest_event))
}
