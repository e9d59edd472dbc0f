// OpenAPI specification generation
//
// Used by the server (Swagger UI) and the export-openapi binary.
// The realtime endpoints are WebSocket / SSE upgrades and stay out of the document.

use crate::api;
use pulseboard_core::{Event, EventType};
use utoipa::OpenApi;

/// OpenAPI documentation for the PulseBoard API
#[derive(OpenApi)]
#[openapi(
    paths(
        api::ingest::ingest_event,
        api::ingest::list_events,
        api::health::health,
    ),
    components(
        schemas(
            Event, EventType,
            api::ingest::IngestRequest,
            api::ingest::IngestResponse,
            api::ingest::EventsResponse,
            api::health::HealthResponse,
            api::ErrorResponse,
        )
    ),
    tags(
        (name = "ingest", description = "Event ingestion and recent events (API key)"),
        (name = "health", description = "Liveness")
    ),
    info(
        title = "PulseBoard API",
        version = "0.1.0",
        description = "Event ingestion for PulseBoard projects",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI spec as a pretty-printed JSON string
    pub fn to_json() -> serde_json::Result<String> {
        Self::openapi().to_pretty_json()
    }
}
