//! PostgreSQL implementation of JobStore
//!
//! Production persistence using PostgreSQL with:
//! - Efficient job claiming with SKIP LOCKED
//! - Dedup via a partial unique index on untouched pending jobs
//! - Row-locked promotion of recurring registrations, so concurrent
//!   processes never fire the same slot twice

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::store::*;
use crate::reliability::RetryPolicy;
use crate::schedule::CronSchedule;

/// PostgreSQL implementation of JobStore
///
/// Expects the `jobs` and `repeatable_jobs` tables from the workspace
/// migrations.
///
/// # Example
///
/// ```ignore
/// use pulseboard_durable::PostgresJobStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/pulseboard").await?;
/// let store = PostgresJobStore::new(pool);
/// ```
#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn to_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_default()
}

impl PostgresJobStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_job(
        tx: &mut Transaction<'_, Postgres>,
        job: &NewJob,
        visible_at: DateTime<Utc>,
    ) -> Result<Option<Uuid>, StoreError> {
        let policy = to_json(&job.retry_policy)?;
        let row = sqlx::query(
            r#"
            INSERT INTO jobs (id, queue, name, payload, max_attempts, retry_policy, dedup_key, visible_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (queue, dedup_key)
                WHERE status = 'pending' AND attempt = 0 AND dedup_key IS NOT NULL
                DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&job.queue)
        .bind(&job.name)
        .bind(&job.payload)
        .bind(i32::try_from(job.retry_policy.max_attempts).unwrap_or(i32::MAX))
        .bind(policy)
        .bind(&job.dedup_key)
        .bind(visible_at)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| r.get("id")))
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(queue = %job.queue, name = %job.name))]
    async fn enqueue(&self, job: NewJob) -> Result<EnqueueOutcome, StoreError> {
        let visible_at = job.run_at.unwrap_or_else(Utc::now);

        // The pending duplicate can be claimed between the conflicting insert
        // and the lookup; one more insert settles it.
        for _ in 0..2 {
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            if let Some(id) = Self::insert_job(&mut tx, &job, visible_at).await? {
                tx.commit().await.map_err(db_err)?;
                return Ok(EnqueueOutcome::Enqueued(id));
            }

            let existing: Option<Uuid> = sqlx::query_scalar(
                r#"
                SELECT id FROM jobs
                WHERE queue = $1 AND dedup_key = $2
                  AND status = 'pending' AND attempt = 0
                "#,
            )
            .bind(&job.queue)
            .bind(&job.dedup_key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
            tx.commit().await.map_err(db_err)?;

            if let Some(id) = existing {
                debug!(job_id = %id, "coalesced into pending job");
                return Ok(EnqueueOutcome::Deduplicated(id));
            }
        }

        Err(StoreError::Database(
            "enqueue lost the dedup race twice".to_string(),
        ))
    }

    #[instrument(skip(self))]
    async fn claim_jobs(
        &self,
        worker_id: &str,
        queues: &[String],
        max_jobs: usize,
    ) -> Result<Vec<ClaimedJob>, StoreError> {
        if queues.is_empty() || max_jobs == 0 {
            return Ok(vec![]);
        }

        let rows = sqlx::query(
            r#"
            WITH claimable AS (
                SELECT id
                FROM jobs
                WHERE status = 'pending'
                  AND queue = ANY($1)
                  AND visible_at <= NOW()
                ORDER BY visible_at, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs j
            SET status = 'claimed',
                claimed_by = $3,
                claimed_at = NOW(),
                attempt = attempt + 1
            FROM claimable c
            WHERE j.id = c.id
            RETURNING j.id, j.queue, j.name, j.payload, j.attempt, j.max_attempts
            "#,
        )
        .bind(queues)
        .bind(to_i32(max_jobs))
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to claim jobs: {}", e);
            db_err(e)
        })?;

        let claimed: Vec<ClaimedJob> = rows
            .iter()
            .map(|row| ClaimedJob {
                id: row.get("id"),
                queue: row.get("queue"),
                name: row.get("name"),
                payload: row.get("payload"),
                attempt: row.get::<i32, _>("attempt").max(0) as u32,
                max_attempts: row.get::<i32, _>("max_attempts").max(0) as u32,
            })
            .collect();

        if !claimed.is_empty() {
            debug!(worker_id, count = claimed.len(), "claimed jobs");
        }

        Ok(claimed)
    }

    #[instrument(skip(self, result))]
    async fn complete_job(
        &self,
        job_id: Uuid,
        result: serde_json::Value,
    ) -> Result<(), StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed',
                result = $2,
                claimed_by = NULL,
                completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if done.rows_affected() == 0 {
            return Err(StoreError::JobNotFound(job_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<JobFailureOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query(
            r#"
            SELECT attempt, retry_policy
            FROM jobs
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or(StoreError::JobNotFound(job_id))?;

        let attempt = row.get::<i32, _>("attempt").max(0) as u32;
        let policy: RetryPolicy = serde_json::from_value(row.get("retry_policy"))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let outcome = if policy.has_attempts_remaining(attempt) {
            let next_attempt = attempt + 1;
            let delay = policy.delay_for_attempt(next_attempt);

            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'pending',
                    claimed_by = NULL,
                    claimed_at = NULL,
                    last_error = $2,
                    error_history = error_history || to_jsonb($2::text),
                    visible_at = $3
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(error)
            .bind(Utc::now() + chrono_duration(delay))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            JobFailureOutcome::WillRetry {
                next_attempt,
                delay,
            }
        } else {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'dead',
                    claimed_by = NULL,
                    last_error = $2,
                    error_history = error_history || to_jsonb($2::text),
                    completed_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(error)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            JobFailureOutcome::Dead
        };

        tx.commit().await.map_err(db_err)?;
        Ok(outcome)
    }

    #[instrument(skip(self, error))]
    async fn kill_job(&self, job_id: Uuid, error: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'dead',
                claimed_by = NULL,
                claimed_at = NULL,
                last_error = $2,
                error_history = error_history || to_jsonb($2::text),
                completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::JobNotFound(job_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn reclaim_stale_jobs(
        &self,
        stale_threshold: Duration,
    ) -> Result<Vec<Uuid>, StoreError> {
        let cutoff = Utc::now() - chrono_duration(stale_threshold);

        let rows = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                claimed_by = NULL,
                claimed_at = NULL
            WHERE status = 'claimed'
              AND claimed_at < $1
            RETURNING id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to reclaim stale jobs: {}", e);
            db_err(e)
        })?;

        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn purge_completed_jobs(&self, older_than: Duration) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - chrono_duration(older_than);

        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status = 'completed'
              AND completed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to purge completed jobs: {}", e);
            db_err(e)
        })?;

        Ok(result.rows_affected())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<JobInfo>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, queue, name, status, attempt, max_attempts, last_error, visible_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| JobInfo {
            id: r.get("id"),
            queue: r.get("queue"),
            name: r.get("name"),
            status: JobStatus::from(r.get::<&str, _>("status")),
            attempt: r.get::<i32, _>("attempt").max(0) as u32,
            max_attempts: r.get::<i32, _>("max_attempts").max(0) as u32,
            last_error: r.get("last_error"),
            visible_at: r.get("visible_at"),
        }))
    }

    async fn list_dead_jobs(
        &self,
        queue: &str,
        pagination: Pagination,
    ) -> Result<Vec<DeadJob>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, queue, name, payload, attempt, last_error, error_history, completed_at
            FROM jobs
            WHERE status = 'dead' AND queue = $1
            ORDER BY completed_at DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(queue)
        .bind(i64::from(pagination.offset))
        .bind(i64::from(pagination.limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|r| {
                let history: Vec<String> = serde_json::from_value(r.get("error_history"))
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                let completed_at: Option<DateTime<Utc>> = r.get("completed_at");
                Ok(DeadJob {
                    id: r.get("id"),
                    queue: r.get("queue"),
                    name: r.get("name"),
                    payload: r.get("payload"),
                    attempts: r.get::<i32, _>("attempt").max(0) as u32,
                    last_error: r
                        .get::<Option<String>, _>("last_error")
                        .unwrap_or_default(),
                    error_history: history,
                    dead_at: completed_at.unwrap_or_else(Utc::now),
                })
            })
            .collect()
    }

    #[instrument(skip(self, job), fields(queue = %job.queue, name = %job.name))]
    async fn add_repeatable(&self, job: RepeatableJob) -> Result<(), StoreError> {
        let schedule = CronSchedule::parse(&job.cron)?;
        let next_run_at = schedule.next_after(Utc::now()).ok_or_else(|| {
            StoreError::InvalidSchedule(format!("'{}' never fires", job.cron))
        })?;

        sqlx::query(
            r#"
            INSERT INTO repeatable_jobs (queue, name, cron, payload, retry_policy, next_run_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (queue, name) DO UPDATE
            SET cron = EXCLUDED.cron,
                payload = EXCLUDED.payload,
                retry_policy = EXCLUDED.retry_policy,
                next_run_at = EXCLUDED.next_run_at,
                last_run_at = NULL
            "#,
        )
        .bind(&job.queue)
        .bind(&job.name)
        .bind(schedule.expression())
        .bind(&job.payload)
        .bind(to_json(&job.retry_policy)?)
        .bind(next_run_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn remove_repeatables(&self, queue: &str, name: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM repeatable_jobs WHERE queue = $1 AND name = $2")
            .bind(queue)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn list_repeatables(&self, queue: &str) -> Result<Vec<RepeatableInfo>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT queue, name, cron, next_run_at, last_run_at
            FROM repeatable_jobs
            WHERE queue = $1
            ORDER BY name
            "#,
        )
        .bind(queue)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|r| RepeatableInfo {
                queue: r.get("queue"),
                name: r.get("name"),
                cron: r.get("cron"),
                next_run_at: r.get("next_run_at"),
                last_run_at: r.get("last_run_at"),
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn promote_due_repeatables(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let due = sqlx::query(
            r#"
            SELECT queue, name, cron, payload, retry_policy
            FROM repeatable_jobs
            WHERE next_run_at <= $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        let mut enqueued = Vec::with_capacity(due.len());
        for row in &due {
            let queue: String = row.get("queue");
            let name: String = row.get("name");
            let cron: String = row.get("cron");
            let retry_policy: RetryPolicy = serde_json::from_value(row.get("retry_policy"))
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            let job = NewJob::new(&queue, &name, row.get("payload")).with_retry_policy(retry_policy);
            if let Some(id) = Self::insert_job(&mut tx, &job, now).await? {
                enqueued.push(id);
            }

            match CronSchedule::parse(&cron)?.next_after(now) {
                Some(next) => {
                    sqlx::query(
                        r#"
                        UPDATE repeatable_jobs
                        SET next_run_at = $3, last_run_at = $4
                        WHERE queue = $1 AND name = $2
                        "#,
                    )
                    .bind(&queue)
                    .bind(&name)
                    .bind(next)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                }
                None => {
                    sqlx::query("DELETE FROM repeatable_jobs WHERE queue = $1 AND name = $2")
                        .bind(&queue)
                        .bind(&name)
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err)?;
                }
            }
        }

        tx.commit().await.map_err(db_err)?;

        if !enqueued.is_empty() {
            debug!(count = enqueued.len(), "promoted recurring jobs");
        }
        Ok(enqueued)
    }
}
