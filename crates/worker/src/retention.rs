// Retention worker

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pulseboard_core::{EventStore, PulseError, Result};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    pub cutoff: DateTime<Utc>,
    pub deleted: u64,
}

pub struct RetentionWorker {
    events: Arc<dyn EventStore>,
    retention_days: u32,
}

impl RetentionWorker {
    pub fn new(events: Arc<dyn EventStore>, retention_days: u32) -> Self {
        Self {
            events,
            retention_days,
        }
    }

    pub async fn run(&self) -> Result<RetentionReport> {
        self.run_at(Utc::now()).await
    }

    /// Deletes every event with `timestamp < now - retention_days`.
    ///
    /// A zero horizon, or one reaching past the representable calendar, is
    /// a configuration error and deletes nothing.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RetentionReport> {
        let cutoff = self.cutoff(now)?;
        let deleted = self.events.delete_events_before(cutoff).await?;
        info!(%cutoff, deleted, "Retention cleanup finished");
        Ok(RetentionReport { cutoff, deleted })
    }

    fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        if self.retention_days == 0 {
            return Err(PulseError::config("retention horizon must be at least one day"));
        }
        Duration::try_days(i64::from(self.retention_days))
            .and_then(|horizon| now.checked_sub_signed(horizon))
            .ok_or_else(|| {
                PulseError::config(format!(
                    "retention horizon of {} days is out of range",
                    self.retention_days
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulseboard_core::{EventType, NewEvent};
    use pulseboard_storage::models::{CreateProjectRow, CreateUserRow};
    use pulseboard_storage::StorageBackend;

    #[tokio::test]
    async fn test_deletes_only_old_events_and_is_idempotent() {
        let storage = Arc::new(StorageBackend::in_memory());
        let user = storage
            .create_user(CreateUserRow {
                email: "a@example.com".to_string(),
                name: "A".to_string(),
            })
            .await
            .unwrap();
        let project = storage
            .create_project(CreateProjectRow {
                name: "p".to_string(),
                api_key: "pb_p".to_string(),
                owner_user_id: user.id,
            })
            .await
            .unwrap();

        let now = Utc::now();
        for age_days in [45, 31, 29, 0] {
            storage
                .insert_event(NewEvent::new(
                    project.id,
                    EventType::Event,
                    "e",
                    None,
                    Some(now - Duration::days(age_days)),
                ))
                .await
                .unwrap();
        }

        let worker = RetentionWorker::new(storage.clone(), 30);
        let first = worker.run_at(now).await.unwrap();
        assert_eq!(first.deleted, 2);
        assert_eq!(first.cutoff, now - Duration::days(30));

        let second = worker.run_at(now).await.unwrap();
        assert_eq!(second.deleted, 0);

        let remaining = storage.recent_events(project.id, 10).await.unwrap();
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_horizon_is_rejected_without_deleting() {
        let storage = Arc::new(StorageBackend::in_memory());
        let user = storage
            .create_user(CreateUserRow {
                email: "z@example.com".to_string(),
                name: "Z".to_string(),
            })
            .await
            .unwrap();
        let project = storage
            .create_project(CreateProjectRow {
                name: "z".to_string(),
                api_key: "pb_z".to_string(),
                owner_user_id: user.id,
            })
            .await
            .unwrap();
        storage
            .insert_event(NewEvent::new(project.id, EventType::Error, "fresh", None, None))
            .await
            .unwrap();

        let err = RetentionWorker::new(storage.clone(), 0).run().await.unwrap_err();
        assert!(matches!(err, PulseError::Configuration(_)));
        assert_eq!(storage.recent_events(project.id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_huge_horizon_fails_instead_of_panicking() {
        let worker = RetentionWorker::new(Arc::new(StorageBackend::in_memory()), u32::MAX);
        let err = worker.run().await.unwrap_err();
        assert!(matches!(err, PulseError::Configuration(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_store() {
        let worker = RetentionWorker::new(Arc::new(StorageBackend::in_memory()), 30);
        assert_eq!(worker.run().await.unwrap().deleted, 0);
    }
}
