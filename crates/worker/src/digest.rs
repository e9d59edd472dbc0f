// Digest worker
//
// One email per project owner summarizing the last 24 hours. A failure for
// one user is recorded and the loop moves on; the job itself succeeds so a
// retry never re-mails users who already got their digest.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pulseboard_core::{DigestRecipient, EventStore, EventType, Mailer, ProjectDirectory, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::email::{render_digest_email, ProjectSummary};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestFailure {
    pub email: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DigestReport {
    pub recipients: usize,
    pub sent: usize,
    pub failed: Vec<DigestFailure>,
}

pub struct DigestWorker {
    events: Arc<dyn EventStore>,
    projects: Arc<dyn ProjectDirectory>,
    mailer: Arc<dyn Mailer>,
}

impl DigestWorker {
    pub fn new(
        events: Arc<dyn EventStore>,
        projects: Arc<dyn ProjectDirectory>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            events,
            projects,
            mailer,
        }
    }

    pub async fn run(&self) -> Result<DigestReport> {
        self.run_at(Utc::now()).await
    }

    /// Listing recipients failing fails the job; anything per user is
    /// recorded in the report instead.
    #[instrument(skip(self))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<DigestReport> {
        let since = now - Duration::hours(24);
        let recipients = self.projects.list_digest_recipients().await?;

        let mut report = DigestReport {
            recipients: recipients.len(),
            ..Default::default()
        };

        for recipient in recipients.iter().filter(|r| !r.projects.is_empty()) {
            match self.send_one(recipient, since).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    warn!(email = %recipient.email, error = %e, "Failed to send digest");
                    report.failed.push(DigestFailure {
                        email: recipient.email.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            recipients = report.recipients,
            sent = report.sent,
            failed = report.failed.len(),
            "Digest run finished"
        );
        Ok(report)
    }

    async fn send_one(&self, recipient: &DigestRecipient, since: DateTime<Utc>) -> Result<()> {
        let mut summaries = Vec::with_capacity(recipient.projects.len());
        for (project_id, name) in &recipient.projects {
            let event_count = self.events.count_events(*project_id, since, None).await?;
            let error_count = self
                .events
                .count_events(*project_id, since, Some(EventType::Error))
                .await?;
            summaries.push(ProjectSummary {
                name: name.clone(),
                event_count,
                error_count,
            });
        }

        let message = render_digest_email(&recipient.email, &recipient.name, &summaries);
        self.mailer.send(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::RecordingMailer;
    use pulseboard_core::NewEvent;
    use pulseboard_storage::models::{CreateProjectRow, CreateUserRow};
    use pulseboard_storage::StorageBackend;
    use uuid::Uuid;

    async fn user_with_project(storage: &StorageBackend, email: &str, project: &str) -> Uuid {
        let user = storage
            .create_user(CreateUserRow {
                email: email.to_string(),
                name: email.split('@').next().unwrap_or_default().to_string(),
            })
            .await
            .unwrap();
        storage
            .create_project(CreateProjectRow {
                name: project.to_string(),
                api_key: format!("pb_{project}"),
                owner_user_id: user.id,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_one_failing_user_does_not_stop_the_rest() {
        let storage = Arc::new(StorageBackend::in_memory());
        user_with_project(&storage, "a@example.com", "alpha").await;
        user_with_project(&storage, "b@example.com", "beta").await;
        user_with_project(&storage, "c@example.com", "gamma").await;

        let mailer = Arc::new(RecordingMailer::new());
        mailer.fail_for("b@example.com");

        let worker = DigestWorker::new(storage.clone(), storage.clone(), mailer.clone());
        let report = worker.run().await.unwrap();

        assert_eq!(report.recipients, 3);
        assert_eq!(report.sent, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].email, "b@example.com");

        let mut to: Vec<_> = mailer.sent().into_iter().map(|m| m.to).collect();
        to.sort();
        assert_eq!(to, vec!["a@example.com", "c@example.com"]);
    }

    #[tokio::test]
    async fn test_counts_cover_last_24_hours() {
        let storage = Arc::new(StorageBackend::in_memory());
        let project_id = user_with_project(&storage, "a@example.com", "alpha").await;
        let now = Utc::now();

        for (event_type, age_hours) in [
            (EventType::Error, 1),
            (EventType::Event, 2),
            (EventType::Metric, 3),
            (EventType::Error, 30),
        ] {
            storage
                .insert_event(NewEvent::new(
                    project_id,
                    event_type,
                    "e",
                    None,
                    Some(now - Duration::hours(age_hours)),
                ))
                .await
                .unwrap();
        }

        let mailer = Arc::new(RecordingMailer::new());
        let worker = DigestWorker::new(storage.clone(), storage.clone(), mailer.clone());
        let report = worker.run_at(now).await.unwrap();
        assert_eq!(report.sent, 1);

        let html = &mailer.sent()[0].html;
        assert!(html.contains(">alpha</td>"));
        assert!(html.contains(">3</td>"));
        assert!(html.contains(">1</td>"));
    }

    #[tokio::test]
    async fn test_users_without_projects_get_nothing() {
        let storage = Arc::new(StorageBackend::in_memory());
        storage
            .create_user(CreateUserRow {
                email: "idle@example.com".to_string(),
                name: "Idle".to_string(),
            })
            .await
            .unwrap();

        let mailer = Arc::new(RecordingMailer::new());
        let worker = DigestWorker::new(storage.clone(), storage.clone(), mailer.clone());
        let report = worker.run().await.unwrap();
        assert_eq!(report.sent, 0);
        assert!(mailer.sent().is_empty());
    }
}
