use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded" after a failed snapshot write).
    pub status: String,
    /// Version of the timer state currently held in memory.
    pub state_version: u64,
    /// Number of connected WebSocket observers.
    pub observers: usize,
    /// Number of connected SSE displays.
    pub sse_subscribers: usize,
}

impl HealthResponse {
    /// Build the payload from the current degraded flag.
    pub fn new(
        degraded: bool,
        state_version: u64,
        observers: usize,
        sse_subscribers: usize,
    ) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            state_version,
            observers,
            sse_subscribers,
        }
    }
}
