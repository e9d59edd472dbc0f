// Repository layer for database operations

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pulseboard_core::{EventType, NewEvent};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::*;

const EVENT_COLUMNS: &str =
    "id, project_id, type AS event_type, name, payload, timestamp, received_at";

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the workspace migrations (events and jobs schema)
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    // ============================================
    // Users
    // ============================================

    pub async fn create_user(&self, input: CreateUserRow) -> Result<UserRow> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, email, name)
            VALUES ($1, $2, $3)
            RETURNING id, email, name, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&input.email)
        .bind(&input.name)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    // ============================================
    // Projects
    // ============================================

    pub async fn create_project(&self, input: CreateProjectRow) -> Result<ProjectRow> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            INSERT INTO projects (id, name, api_key, owner_user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, api_key, owner_user_id, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&input.name)
        .bind(&input.api_key)
        .bind(input.owner_user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_project_by_api_key(&self, api_key: &str) -> Result<Option<ProjectRow>> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, name, api_key, owner_user_id, created_at
            FROM projects
            WHERE api_key = $1
            "#,
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_projects_for_user(&self, user_id: Uuid) -> Result<Vec<ProjectRow>> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, name, api_key, owner_user_id, created_at
            FROM projects
            WHERE owner_user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn is_project_owner(&self, project_id: Uuid, user_id: Uuid) -> Result<bool> {
        let owned: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE id = $1 AND owner_user_id = $2)",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(owned)
    }

    pub async fn get_project_owner(&self, project_id: Uuid) -> Result<Option<ProjectOwnerRow>> {
        let row = sqlx::query_as::<_, ProjectOwnerRow>(
            r#"
            SELECT p.id AS project_id, p.name AS project_name,
                   u.id AS user_id, u.email, u.name AS user_name
            FROM projects p
            JOIN users u ON u.id = p.owner_user_id
            WHERE p.id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// One row per (owner, project), grouped by user
    pub async fn list_recipient_projects(&self) -> Result<Vec<RecipientProjectRow>> {
        let rows = sqlx::query_as::<_, RecipientProjectRow>(
            r#"
            SELECT u.id AS user_id, u.email, u.name AS user_name,
                   p.id AS project_id, p.name AS project_name
            FROM users u
            JOIN projects p ON p.owner_user_id = u.id
            ORDER BY u.id, p.created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ============================================
    // Events
    // ============================================

    pub async fn insert_event(&self, input: NewEvent) -> Result<EventRow> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            INSERT INTO events (id, project_id, type, name, payload, timestamp, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, clock_timestamp())
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(input.project_id)
        .bind(input.event_type.as_str())
        .bind(&input.name)
        .bind(&input.payload)
        .bind(input.timestamp)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_recent_events(&self, project_id: Uuid, limit: i64) -> Result<Vec<EventRow>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE project_id = $1
            ORDER BY received_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(project_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn count_events(
        &self,
        project_id: Uuid,
        since: DateTime<Utc>,
        event_type: Option<EventType>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM events
            WHERE project_id = $1
              AND timestamp >= $2
              AND ($3::text IS NULL OR type = $3)
            "#,
        )
        .bind(project_id)
        .bind(since)
        .bind(event_type.map(|t| t.as_str()))
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    pub async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM events WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
