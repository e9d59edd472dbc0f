// Ingestion HTTP routes

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use pulseboard_core::{Event, EventType};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::common::{ApiError, ErrorResponse};
use crate::services::IngestInput;
use crate::AppState;

/// Request body for POST /ingest
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    /// Project API key
    #[schema(example = "pb_3f9c...")]
    pub api_key: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[schema(example = "TypeError")]
    pub name: String,
    /// Arbitrary JSON object (default: `{}`)
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: Option<serde_json::Map<String, serde_json::Value>>,
    /// When the event happened on the client (default: receive time)
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub success: bool,
    #[schema(example = "Event ingested successfully")]
    pub message: String,
    pub data: Event,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventsResponse {
    pub success: bool,
    pub data: Vec<Event>,
}

/// Query parameters for GET /events
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    /// Project API key
    pub api_key: String,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/ingest", post(ingest_event))
        .route("/events", get(list_events))
        .with_state(state)
}

/// POST /ingest - Store one event and fan it out to live subscribers
#[utoipa::path(
    post,
    path = "/ingest",
    request_body = IngestRequest,
    responses(
        (status = 201, description = "Event stored", body = IngestResponse),
        (status = 401, description = "Invalid API key", body = ErrorResponse),
        (status = 500, description = "Event store unavailable", body = ErrorResponse)
    ),
    tag = "ingest"
)]
pub async fn ingest_event(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let input = IngestInput {
        event_type: req.event_type,
        name: req.name,
        payload: req.payload.map(serde_json::Value::Object),
        timestamp: req.timestamp,
    };

    let event = state.ingest.ingest(&req.api_key, input).await?;

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            success: true,
            message: "Event ingested successfully".to_string(),
            data: event,
        }),
    ))
}

/// GET /events - Most recent events of the key's project
#[utoipa::path(
    get,
    path = "/events",
    params(EventsQuery),
    responses(
        (status = 200, description = "Newest first, at most 20", body = EventsResponse),
        (status = 401, description = "Invalid API key", body = ErrorResponse),
        (status = 500, description = "Event store unavailable", body = ErrorResponse)
    ),
    tag = "ingest"
)]
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let events = state.ingest.recent(&query.api_key).await?;
    Ok(Json(EventsResponse {
        success: true,
        data: events,
    }))
}
