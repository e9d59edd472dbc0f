// Alert worker
//
// Recomputes the trailing error count from the event store on every run;
// there is no alert state to lose or to keep consistent.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pulseboard_core::jobs::{AlertJob, ALERTS_QUEUE, ALERT_JOB};
use pulseboard_core::{EventStore, EventType, Mailer, ProjectDirectory, PulseError, Result};
use pulseboard_durable::{NewJob, RetryPolicy};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::email::render_alert_email;

/// What one alert check decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlertOutcome {
    pub error_count: u64,
    pub threshold: u64,
    pub notified: bool,
}

/// The job the ingest path enqueues after every stored event. Pending checks
/// for the same project coalesce into one.
pub fn alert_check_job(project_id: uuid::Uuid, retry_policy: RetryPolicy) -> NewJob {
    let job = AlertJob { project_id };
    NewJob::new(
        ALERTS_QUEUE,
        ALERT_JOB,
        serde_json::json!({ "projectId": project_id }),
    )
    .with_retry_policy(retry_policy)
    .with_dedup_key(job.dedup_key())
}

pub struct AlertWorker {
    events: Arc<dyn EventStore>,
    projects: Arc<dyn ProjectDirectory>,
    mailer: Arc<dyn Mailer>,
    threshold: u64,
    window: Duration,
}

impl AlertWorker {
    pub fn new(
        events: Arc<dyn EventStore>,
        projects: Arc<dyn ProjectDirectory>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            events,
            projects,
            mailer,
            threshold: 10,
            window: Duration::from_secs(60),
        }
    }

    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub async fn check(&self, job: AlertJob) -> Result<AlertOutcome> {
        self.check_at(job, Utc::now()).await
    }

    #[instrument(skip(self), fields(project_id = %job.project_id))]
    pub async fn check_at(&self, job: AlertJob, now: DateTime<Utc>) -> Result<AlertOutcome> {
        let window = chrono::Duration::from_std(self.window)
            .map_err(|e| PulseError::config(format!("alert window out of range: {e}")))?;
        let since = now - window;

        let error_count = self
            .events
            .count_events(job.project_id, since, Some(EventType::Error))
            .await?;

        let mut outcome = AlertOutcome {
            error_count,
            threshold: self.threshold,
            notified: false,
        };

        if error_count < self.threshold {
            debug!(error_count, threshold = self.threshold, "Below alert threshold");
            return Ok(outcome);
        }

        let Some(owner) = self.projects.get_project_owner(job.project_id).await? else {
            debug!("Project no longer exists, skipping alert");
            return Ok(outcome);
        };

        let message = render_alert_email(&owner.email, &owner.project_name, error_count);
        self.mailer.send(message).await?;
        outcome.notified = true;

        info!(
            error_count,
            threshold = self.threshold,
            to = %owner.email,
            "Alert sent"
        );
        Ok(outcome)
    }
}
