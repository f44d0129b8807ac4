/// Snapshot fan-out to observers.
pub mod broadcast;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Debounced, single-writer snapshot persistence.
pub mod persistence_service;
/// Streamlabs alert socket client.
#[cfg(feature = "streamlabs")]
pub mod provider_client;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Timer mutations, countdown and ingestion entry points.
pub mod timer_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
