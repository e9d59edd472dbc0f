//! # Durable Job Queue
//!
//! A PostgreSQL-backed job queue for background work that must survive
//! process restarts.
//!
//! ## Features
//!
//! - **At-least-once delivery**: jobs are claimed with `FOR UPDATE SKIP LOCKED`
//!   and returned to the queue when a worker disappears mid-job
//! - **Automatic retries**: configurable retry policies with exponential backoff and jitter
//! - **Dead jobs**: jobs that exhaust their attempts are kept with their error history
//! - **Recurring jobs**: cron registrations keyed by `(queue, name)`, so re-registering
//!   replaces instead of duplicating
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          producers (enqueue)      RepeatScheduler            │
//! │                                  (promotes due cron jobs)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         JobStore                             │
//! │        (PostgreSQL: jobs, repeatable_jobs | in-memory)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                            │
//! │   (claims jobs per queue, runs handlers, reports outcomes)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use pulseboard_durable::prelude::*;
//!
//! let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
//! store.enqueue(NewJob::new("emails", "welcome", json!({"to": "a@b.c"}))).await?;
//!
//! let pool = WorkerPool::new(store, WorkerPoolConfig::new(vec!["emails".into()]));
//! pool.register_handler("emails", |job| async move {
//!     // send it...
//!     Ok(json!({"sent": true}))
//! });
//! pool.start().await?;
//! ```

pub mod persistence;
pub mod reliability;
pub mod schedule;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::persistence::{
        ClaimedJob, EnqueueOutcome, InMemoryJobStore, JobFailureOutcome, JobStore, NewJob,
        PostgresJobStore, RepeatableJob, StoreError,
    };
    pub use crate::reliability::RetryPolicy;
    pub use crate::schedule::CronSchedule;
    pub use crate::worker::{RepeatScheduler, WorkerPool, WorkerPoolConfig, WorkerPoolError};
}

// Re-export key types at crate root
pub use persistence::{
    ClaimedJob, DeadJob, EnqueueOutcome, InMemoryJobStore, JobFailureOutcome, JobInfo, JobStatus,
    JobStore, NewJob, Pagination, PostgresJobStore, RepeatableInfo, RepeatableJob, StoreError,
};
pub use reliability::RetryPolicy;
pub use schedule::{CronError, CronSchedule};
pub use worker::{
    JobFailure, JobResult, PollerConfig, RepeatScheduler, WorkerPool, WorkerPoolConfig,
    WorkerPoolError, WorkerPoolStatus,
};
