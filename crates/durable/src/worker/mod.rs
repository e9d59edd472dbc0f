//! Job execution
//!
//! This module provides:
//! - [`WorkerPool`] - concurrent job execution for a set of queues
//! - [`JobPoller`] - job polling with adaptive backoff
//! - [`RepeatScheduler`] - turns due recurring registrations into jobs
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkerPool                             │
//! │  ┌─────────────┐                   ┌─────────────────────┐  │
//! │  │  JobPoller  │                   │  Stale Reclaimer    │  │
//! │  │  (polling)  │                   │     (30s)           │  │
//! │  └──────┬──────┘                   └─────────────────────┘  │
//! │         ▼                                                    │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │         Job Executor (Semaphore-limited)            │    │
//! │  │  [Job 1] [Job 2] [Job 3] ... [Job N]                │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pulseboard_durable::worker::{WorkerPool, WorkerPoolConfig};
//!
//! let config = WorkerPoolConfig::new(vec!["alerts".to_string()])
//!     .with_worker_id("alerts-1")
//!     .with_max_concurrency(20);
//!
//! let pool = WorkerPool::new(store, config);
//! pool.register_handler("alerts", |job| async move {
//!     let alert: AlertJob = serde_json::from_value(job.payload).map_err(|e| e.to_string())?;
//!     Ok(json!({"checked": alert.project_id}))
//! });
//!
//! pool.start().await?;
//! pool.shutdown().await?;
//! ```

mod poller;
mod pool;
mod repeat;

pub use poller::{JobPoller, PollerConfig, PollerError};
pub use pool::{
    JobFailure, JobHandler, JobResult, WorkerPool, WorkerPoolConfig, WorkerPoolError,
    WorkerPoolStatus,
};
pub use repeat::RepeatScheduler;
