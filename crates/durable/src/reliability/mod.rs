//! Reliability primitives
//!
//! - [`RetryPolicy`]: bounded attempts with exponential backoff and jitter

mod retry;

pub use retry::RetryPolicy;
