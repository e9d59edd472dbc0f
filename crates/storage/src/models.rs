// Database models (internal, may differ from public DTOs)

use chrono::{DateTime, Utc};
use pulseboard_core::{Event, EventType, Project};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================
// Users
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateUserRow {
    pub email: String,
    pub name: String,
}

// ============================================
// Projects
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    pub owner_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateProjectRow {
    pub name: String,
    pub api_key: String,
    pub owner_user_id: Uuid,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: row.id,
            name: row.name,
            api_key: row.api_key,
            owner_user_id: row.owner_user_id,
        }
    }
}

/// Project joined with its owner
#[derive(Debug, Clone, FromRow)]
pub struct ProjectOwnerRow {
    pub project_id: Uuid,
    pub project_name: String,
    pub user_id: Uuid,
    pub email: String,
    pub user_name: String,
}

// ============================================
// Events
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub event_type: String,
    pub name: String,
    pub payload: sqlx::types::JsonValue,
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = anyhow::Error;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let event_type: EventType = row.event_type.parse().map_err(anyhow::Error::msg)?;
        Ok(Event {
            id: row.id,
            project_id: row.project_id,
            event_type,
            name: row.name,
            payload: row.payload,
            timestamp: row.timestamp,
            received_at: row.received_at,
        })
    }
}

/// Per-user digest source row: one line per owned project
#[derive(Debug, Clone, FromRow)]
pub struct RecipientProjectRow {
    pub user_id: Uuid,
    pub email: String,
    pub user_name: String,
    pub project_id: Uuid,
    pub project_name: String,
}
