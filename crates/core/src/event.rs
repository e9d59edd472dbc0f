// Event domain types
//
// An Event is one discrete signal pushed by a client application.
// Immutable once persisted; `received_at` is owned by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Kind of event reported by a client.
/// - `error`: an exception or failure (counted by alerting)
/// - `event`: a generic application event
/// - `metric`: a numeric measurement carried in the payload
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Error,
    Event,
    Metric,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Error => "error",
            EventType::Event => "event",
            EventType::Metric => "metric",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(EventType::Error),
            "event" => Ok(EventType::Event),
            "metric" => Ok(EventType::Metric),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// Persisted event, as returned by the API and pushed to live subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique identifier (UUID v7).
    pub id: Uuid,
    /// Project the event belongs to.
    pub project_id: Uuid,
    /// Event kind.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Short name, e.g. "TypeError" or "checkout_completed".
    pub name: String,
    /// Opaque key-value payload.
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub payload: serde_json::Value,
    /// Client-declared instant of occurrence.
    pub timestamp: DateTime<Utc>,
    /// Server-assigned persistence instant.
    pub received_at: DateTime<Utc>,
}

/// Event as accepted for persistence. The store assigns `id` and
/// `received_at`; `timestamp` is already resolved (client value or now).
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub project_id: Uuid,
    pub event_type: EventType,
    pub name: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl NewEvent {
    /// Build an event, defaulting `timestamp` to now and `payload` to `{}`.
    pub fn new(
        project_id: Uuid,
        event_type: EventType,
        name: impl Into<String>,
        payload: Option<serde_json::Value>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            project_id,
            event_type,
            name: name.into(),
            payload: payload.unwrap_or_else(|| serde_json::json!({})),
            timestamp: timestamp.unwrap_or_else(Utc::now),
        }
    }

    /// Materialize with store-assigned identity.
    pub fn into_event(self, id: Uuid, received_at: DateTime<Utc>) -> Event {
        Event {
            id,
            project_id: self.project_id,
            event_type: self.event_type,
            name: self.name,
            payload: self.payload,
            timestamp: self.timestamp,
            received_at,
        }
    }
}
