//! Persistence layer for the job queue
//!
//! This module provides:
//! - [`JobStore`] trait for jobs and recurring registrations
//! - [`InMemoryJobStore`] for tests and dev mode
//! - [`PostgresJobStore`] for production

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryJobStore;
pub use postgres::PostgresJobStore;
pub use store::{
    ClaimedJob, DeadJob, EnqueueOutcome, JobFailureOutcome, JobInfo, JobStatus, JobStore, NewJob,
    Pagination, RepeatableInfo, RepeatableJob, StoreError,
};
