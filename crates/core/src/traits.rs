// Collaborator traits
//
// The ingest path, the realtime gateway and the workers only see these
// interfaces. Storage implements the first two; the worker crate provides
// Mailer implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::event::{Event, EventType, NewEvent};
use crate::project::{DigestRecipient, Project, ProjectOwner};

/// Durable append log of events, grouped by project.
///
/// Implementations must tolerate concurrent inserts and deletes; no
/// cross-operation locking is assumed.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist an event, assigning `id` and a monotonic `received_at`.
    async fn insert_event(&self, event: NewEvent) -> Result<Event>;

    /// Most recent events of a project, `received_at` descending.
    async fn recent_events(&self, project_id: Uuid, limit: usize) -> Result<Vec<Event>>;

    /// Count events of a project whose `timestamp >= since`, optionally
    /// restricted to one type.
    async fn count_events(
        &self,
        project_id: Uuid,
        since: DateTime<Utc>,
        event_type: Option<EventType>,
    ) -> Result<u64>;

    /// Delete every event with `timestamp < cutoff`. Returns rows removed.
    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Read access to projects and their owners.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn resolve_project_by_api_key(&self, api_key: &str) -> Result<Option<Project>>;

    async fn is_project_owner(&self, project_id: Uuid, user_id: Uuid) -> Result<bool>;

    async fn get_project_owner(&self, project_id: Uuid) -> Result<Option<ProjectOwner>>;

    /// Every user owning at least one project.
    async fn list_digest_recipients(&self) -> Result<Vec<DigestRecipient>>;
}

/// Outbound email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one message. Failures surface as `PulseError::Delivery`.
    async fn send(&self, message: EmailMessage) -> Result<()>;
}
