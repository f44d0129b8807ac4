use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the subathon timer.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::timer_stream,
        crate::routes::websocket::ws_handler,
        crate::routes::timer::current_state,
        crate::routes::timer::ingest_event,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::timer::TimerSnapshot,
            crate::dto::timer::EventSecondsDto,
            crate::dto::provider::IngestResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "timer", description = "Timer state and provider ingestion"),
        (name = "observers", description = "WebSocket and SSE observer streams"),
    )
)]
pub struct ApiDoc;
