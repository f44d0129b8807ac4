use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/timer",
    tag = "observers",
    responses((status = 200, description = "Timer snapshot stream", content_type = "text/event-stream", body = String))
)]
/// Stream timer snapshots to read-only displays, starting with the current one.
pub async fn timer_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let (initial, receiver) = sse_service::subscribe_timer(&state).await;
    info!("New timer SSE connection");
    sse_service::to_sse_stream(initial, receiver, state.shutdown_watcher())
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/timer", get(timer_stream))
}
