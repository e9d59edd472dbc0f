// Storage backend abstraction
// Decision: Use enum dispatch for simplicity over trait objects
//
// StorageBackend works with either PostgreSQL (production) or in-memory
// (dev mode) storage and implements the core EventStore and
// ProjectDirectory traits for both.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulseboard_core::{
    DigestRecipient, Event, EventStore, EventType, NewEvent, Project, ProjectDirectory,
    ProjectOwner, PulseError,
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::memory::InMemoryDatabase;
use crate::models::*;
use crate::repositories::Database;

/// Storage backend that can be either PostgreSQL or in-memory
#[derive(Clone)]
pub enum StorageBackend {
    /// PostgreSQL database (production)
    Postgres(Database),
    /// In-memory database (dev mode)
    InMemory(Arc<InMemoryDatabase>),
}

impl StorageBackend {
    /// Create a PostgreSQL storage backend from a database URL
    pub async fn postgres(database_url: &str) -> Result<Self> {
        let db = Database::from_url(database_url).await?;
        Ok(Self::Postgres(db))
    }

    /// Create an in-memory storage backend
    pub fn in_memory() -> Self {
        Self::InMemory(Arc::new(InMemoryDatabase::new()))
    }

    /// Check if this is dev mode (in-memory)
    pub fn is_dev_mode(&self) -> bool {
        matches!(self, Self::InMemory(_))
    }

    /// Name reported by the health endpoint
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::InMemory(_) => "memory",
        }
    }

    /// Get the PostgreSQL pool if using PostgreSQL backend
    /// Returns None for in-memory backend
    pub fn pool(&self) -> Option<&PgPool> {
        match self {
            Self::Postgres(db) => Some(db.pool()),
            Self::InMemory(_) => None,
        }
    }

    /// Run migrations (no-op for in-memory)
    pub async fn migrate(&self) -> Result<()> {
        match self {
            Self::Postgres(db) => db.migrate().await,
            Self::InMemory(_) => Ok(()),
        }
    }

    // ============================================
    // Users and projects
    // ============================================

    pub async fn create_user(&self, input: CreateUserRow) -> Result<UserRow> {
        match self {
            Self::Postgres(db) => db.create_user(input).await,
            Self::InMemory(db) => db.create_user(input).await,
        }
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        match self {
            Self::Postgres(db) => db.get_user_by_email(email).await,
            Self::InMemory(db) => db.get_user_by_email(email).await,
        }
    }

    pub async fn create_project(&self, input: CreateProjectRow) -> Result<ProjectRow> {
        match self {
            Self::Postgres(db) => db.create_project(input).await,
            Self::InMemory(db) => db.create_project(input).await,
        }
    }

    pub async fn list_projects_for_user(&self, user_id: Uuid) -> Result<Vec<ProjectRow>> {
        match self {
            Self::Postgres(db) => db.list_projects_for_user(user_id).await,
            Self::InMemory(db) => db.list_projects_for_user(user_id).await,
        }
    }
}

fn store_err(e: anyhow::Error) -> PulseError {
    PulseError::persistence(e.to_string())
}

/// Fold (user, project) rows, already ordered by user, into recipients
fn group_recipients(rows: Vec<RecipientProjectRow>) -> Vec<DigestRecipient> {
    let mut recipients: Vec<DigestRecipient> = Vec::new();
    for row in rows {
        match recipients.last_mut() {
            Some(current) if current.user_id == row.user_id => {
                current.projects.push((row.project_id, row.project_name));
            }
            _ => recipients.push(DigestRecipient {
                user_id: row.user_id,
                email: row.email,
                name: row.user_name,
                projects: vec![(row.project_id, row.project_name)],
            }),
        }
    }
    recipients
}

// ============================================
// EventStore
// ============================================

#[async_trait]
impl EventStore for StorageBackend {
    async fn insert_event(&self, event: NewEvent) -> pulseboard_core::Result<Event> {
        let row = match self {
            Self::Postgres(db) => db.insert_event(event).await,
            Self::InMemory(db) => db.insert_event(event).await,
        }
        .map_err(store_err)?;
        Event::try_from(row).map_err(store_err)
    }

    async fn recent_events(
        &self,
        project_id: Uuid,
        limit: usize,
    ) -> pulseboard_core::Result<Vec<Event>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match self {
            Self::Postgres(db) => db.list_recent_events(project_id, limit).await,
            Self::InMemory(db) => db.list_recent_events(project_id, limit).await,
        }
        .map_err(store_err)?;
        rows.into_iter()
            .map(|row| Event::try_from(row).map_err(store_err))
            .collect()
    }

    async fn count_events(
        &self,
        project_id: Uuid,
        since: DateTime<Utc>,
        event_type: Option<EventType>,
    ) -> pulseboard_core::Result<u64> {
        let count = match self {
            Self::Postgres(db) => db.count_events(project_id, since, event_type).await,
            Self::InMemory(db) => db.count_events(project_id, since, event_type).await,
        }
        .map_err(store_err)?;
        Ok(count.max(0) as u64)
    }

    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> pulseboard_core::Result<u64> {
        match self {
            Self::Postgres(db) => db.delete_events_before(cutoff).await,
            Self::InMemory(db) => db.delete_events_before(cutoff).await,
        }
        .map_err(store_err)
    }
}

// ============================================
// ProjectDirectory
// ============================================

#[async_trait]
impl ProjectDirectory for StorageBackend {
    async fn resolve_project_by_api_key(
        &self,
        api_key: &str,
    ) -> pulseboard_core::Result<Option<Project>> {
        let row = match self {
            Self::Postgres(db) => db.get_project_by_api_key(api_key).await,
            Self::InMemory(db) => db.get_project_by_api_key(api_key).await,
        }
        .map_err(store_err)?;
        Ok(row.map(Project::from))
    }

    async fn is_project_owner(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> pulseboard_core::Result<bool> {
        match self {
            Self::Postgres(db) => db.is_project_owner(project_id, user_id).await,
            Self::InMemory(db) => db.is_project_owner(project_id, user_id).await,
        }
        .map_err(store_err)
    }

    async fn get_project_owner(
        &self,
        project_id: Uuid,
    ) -> pulseboard_core::Result<Option<ProjectOwner>> {
        let row = match self {
            Self::Postgres(db) => db.get_project_owner(project_id).await,
            Self::InMemory(db) => db.get_project_owner(project_id).await,
        }
        .map_err(store_err)?;
        Ok(row.map(|r| ProjectOwner {
            project_id: r.project_id,
            project_name: r.project_name,
            user_id: r.user_id,
            email: r.email,
            name: r.user_name,
        }))
    }

    async fn list_digest_recipients(&self) -> pulseboard_core::Result<Vec<DigestRecipient>> {
        let rows = match self {
            Self::Postgres(db) => db.list_recipient_projects().await,
            Self::InMemory(db) => db.list_recipient_projects().await,
        }
        .map_err(store_err)?;
        Ok(group_recipients(rows))
    }
}
