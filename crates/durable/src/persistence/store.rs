//! JobStore trait definition

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reliability::RetryPolicy;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Job not found
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Cron expression could not be parsed
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
}

impl From<crate::schedule::CronError> for StoreError {
    fn from(err: crate::schedule::CronError) -> Self {
        StoreError::InvalidSchedule(err.to_string())
    }
}

/// Job status in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Claimed,
    Completed,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Completed => "completed",
            Self::Dead => "dead",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        match s {
            "claimed" => Self::Claimed,
            "completed" => Self::Completed,
            "dead" => Self::Dead,
            _ => Self::Pending,
        }
    }
}

/// A job to be enqueued
#[derive(Debug, Clone)]
pub struct NewJob {
    pub queue: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub retry_policy: RetryPolicy,
    /// Earliest time the job may run (default: now)
    pub run_at: Option<DateTime<Utc>>,
    /// Coalesces with a pending, not yet attempted job carrying the same key
    pub dedup_key: Option<String>,
}

impl NewJob {
    pub fn new(
        queue: impl Into<String>,
        name: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            queue: queue.into(),
            name: name.into(),
            payload,
            retry_policy: RetryPolicy::default(),
            run_at: None,
            dedup_key: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_run_at(mut self, run_at: DateTime<Utc>) -> Self {
        self.run_at = Some(run_at);
        self
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }
}

/// Result of an enqueue call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new job was inserted
    Enqueued(Uuid),
    /// An equivalent pending job already exists
    Deduplicated(Uuid),
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> Uuid {
        match self {
            Self::Enqueued(id) | Self::Deduplicated(id) => *id,
        }
    }
}

/// A job that has been claimed by a worker
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub queue: String,
    pub name: String,
    pub payload: serde_json::Value,
    /// 1-based attempt number of this execution
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Outcome of failing a job
#[derive(Debug, Clone, PartialEq)]
pub enum JobFailureOutcome {
    /// Job returns to the queue and becomes visible after `delay`
    WillRetry { next_attempt: u32, delay: Duration },

    /// Attempts exhausted; job kept as dead with its error history
    Dead,
}

/// Snapshot of a job, for inspection and tests
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub id: Uuid,
    pub queue: String,
    pub name: String,
    pub status: JobStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub visible_at: DateTime<Utc>,
}

/// A job that exhausted its attempts
#[derive(Debug, Clone)]
pub struct DeadJob {
    pub id: Uuid,
    pub queue: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub last_error: String,
    pub error_history: Vec<String>,
    pub dead_at: DateTime<Utc>,
}

/// Pagination parameters
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

/// A recurring registration. `(queue, name)` identifies it.
#[derive(Debug, Clone)]
pub struct RepeatableJob {
    pub queue: String,
    pub name: String,
    pub cron: String,
    pub payload: serde_json::Value,
    pub retry_policy: RetryPolicy,
}

impl RepeatableJob {
    pub fn new(queue: impl Into<String>, name: impl Into<String>, cron: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            name: name.into(),
            cron: cron.into(),
            payload: serde_json::json!({}),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

/// Stored state of a recurring registration
#[derive(Debug, Clone)]
pub struct RepeatableInfo {
    pub queue: String,
    pub name: String,
    pub cron: String,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Store for jobs and recurring registrations
///
/// Implementations must be thread-safe and support concurrent access from
/// many workers and processes.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    // =========================================================================
    // Queue Operations
    // =========================================================================

    /// Enqueue a job, or coalesce it into an equivalent pending one
    async fn enqueue(&self, job: NewJob) -> Result<EnqueueOutcome, StoreError>;

    /// Claim visible pending jobs from the given queues
    ///
    /// Uses SELECT FOR UPDATE SKIP LOCKED for efficient concurrent claiming.
    /// Increments the attempt counter of every claimed job.
    async fn claim_jobs(
        &self,
        worker_id: &str,
        queues: &[String],
        max_jobs: usize,
    ) -> Result<Vec<ClaimedJob>, StoreError>;

    /// Mark a job completed
    async fn complete_job(&self, job_id: Uuid, result: serde_json::Value)
        -> Result<(), StoreError>;

    /// Fail a job (requeue with backoff, or mark dead)
    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<JobFailureOutcome, StoreError>;

    /// Dead-letter a job at once, whatever attempts its policy has left
    async fn kill_job(&self, job_id: Uuid, error: &str) -> Result<(), StoreError>;

    /// Return jobs claimed longer than `stale_threshold` ago to the queue
    async fn reclaim_stale_jobs(&self, stale_threshold: Duration)
        -> Result<Vec<Uuid>, StoreError>;

    /// Delete completed jobs finished more than `older_than` ago.
    /// Returns how many were removed. Dead jobs are kept.
    async fn purge_completed_jobs(&self, older_than: Duration) -> Result<u64, StoreError>;

    /// Inspect a single job
    async fn get_job(&self, job_id: Uuid) -> Result<Option<JobInfo>, StoreError>;

    /// List dead jobs of a queue, most recent first
    async fn list_dead_jobs(
        &self,
        queue: &str,
        pagination: Pagination,
    ) -> Result<Vec<DeadJob>, StoreError>;

    // =========================================================================
    // Recurring Jobs
    // =========================================================================

    /// Register (or replace) a recurring job; first fire is the next cron
    /// match after now
    async fn add_repeatable(&self, job: RepeatableJob) -> Result<(), StoreError>;

    /// Remove every registration for `(queue, name)`. Returns how many existed.
    async fn remove_repeatables(&self, queue: &str, name: &str) -> Result<u64, StoreError>;

    /// Registrations of a queue
    async fn list_repeatables(&self, queue: &str) -> Result<Vec<RepeatableInfo>, StoreError>;

    /// Enqueue one job for every registration due at `now` and advance it to
    /// its next fire after `now`. Missed fires collapse into one job.
    async fn promote_due_repeatables(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError>;
}
