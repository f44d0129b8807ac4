use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether snapshots are being persisted, alongside a few live counters.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let degraded = state.is_degraded();
    if degraded {
        warn!("last snapshot write failed (degraded mode)");
    }
    let version = state.engine().lock().await.state().state_version;
    HealthResponse::new(
        degraded,
        version,
        state.observers().len(),
        state.timer_sse().subscriber_count(),
    )
}
