// Error types for the ingest / realtime / job pipeline

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, PulseError>;

/// Errors that can occur anywhere in the event pipeline
#[derive(Debug, Error)]
pub enum PulseError {
    /// Unknown or malformed API key. Terminal, never retried.
    #[error("Invalid API key")]
    InvalidCredential,

    /// Caller does not own the project it asked for. Terminal, never retried.
    #[error("Unauthorized")]
    Unauthorized,

    /// Broker publish or live-forward failure
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Worker-side failure, retried by the job queue
    #[error("Job execution failed: {0}")]
    JobExecution(String),

    /// Event store unavailable or rejected the write
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PulseError {
    /// Create a delivery error
    pub fn delivery(msg: impl Into<String>) -> Self {
        PulseError::Delivery(msg.into())
    }

    /// Create a job execution error
    pub fn job(msg: impl Into<String>) -> Self {
        PulseError::JobExecution(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        PulseError::Persistence(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        PulseError::Configuration(msg.into())
    }

    /// Credential and authorization failures are rejected at the boundary;
    /// everything transient may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PulseError::Delivery(_) | PulseError::JobExecution(_) | PulseError::Persistence(_)
        )
    }
}

impl From<serde_json::Error> for PulseError {
    fn from(err: serde_json::Error) -> Self {
        PulseError::Internal(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(PulseError::InvalidCredential.to_string(), "Invalid API key");
        assert_eq!(PulseError::Unauthorized.to_string(), "Unauthorized");
        assert_eq!(
            PulseError::persistence("db down").to_string(),
            "Persistence error: db down"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(!PulseError::InvalidCredential.is_retryable());
        assert!(!PulseError::Unauthorized.is_retryable());
        assert!(PulseError::delivery("broker gone").is_retryable());
        assert!(PulseError::job("smtp 421").is_retryable());
        assert!(PulseError::persistence("timeout").is_retryable());
        assert!(!PulseError::config("bad cron").is_retryable());
    }
}
