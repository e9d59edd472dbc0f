// Ingestion service
//
// Persist, then publish, then trigger an alert check. Only persistence can
// fail the call: once the event is stored, broker and queue trouble is
// logged and the caller still gets its event back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pulseboard_core::{
    project_channel, Event, EventStore, EventType, NewEvent, Project, ProjectDirectory,
    PulseError, Result,
};
use pulseboard_durable::{JobStore, RetryPolicy};
use pulseboard_worker::alert_check_job;
use tracing::{debug, instrument, warn};

use crate::broker::Broker;

/// Number of events returned by the recent feed
pub const RECENT_EVENTS_LIMIT: usize = 20;

/// One event as submitted by a client
#[derive(Debug, Clone)]
pub struct IngestInput {
    pub event_type: EventType,
    pub name: String,
    pub payload: Option<serde_json::Value>,
    pub timestamp: Option<DateTime<Utc>>,
}

pub struct IngestService {
    events: Arc<dyn EventStore>,
    projects: Arc<dyn ProjectDirectory>,
    broker: Arc<dyn Broker>,
    jobs: Arc<dyn JobStore>,
    retry_policy: RetryPolicy,
}

impl IngestService {
    pub fn new(
        events: Arc<dyn EventStore>,
        projects: Arc<dyn ProjectDirectory>,
        broker: Arc<dyn Broker>,
        jobs: Arc<dyn JobStore>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            events,
            projects,
            broker,
            jobs,
            retry_policy,
        }
    }

    async fn resolve(&self, api_key: &str) -> Result<Project> {
        self.projects
            .resolve_project_by_api_key(api_key)
            .await?
            .ok_or(PulseError::InvalidCredential)
    }

    #[instrument(skip(self, api_key, input), fields(event_type = %input.event_type))]
    pub async fn ingest(&self, api_key: &str, input: IngestInput) -> Result<Event> {
        let project = self.resolve(api_key).await?;

        let event = self
            .events
            .insert_event(NewEvent::new(
                project.id,
                input.event_type,
                input.name,
                input.payload,
                input.timestamp,
            ))
            .await?;
        debug!(event_id = %event.id, project_id = %project.id, "Event persisted");

        self.publish(&event).await;
        self.trigger_alert_check(project.id).await;

        Ok(event)
    }

    /// Most recent events of the key's project, newest first
    pub async fn recent(&self, api_key: &str) -> Result<Vec<Event>> {
        let project = self.resolve(api_key).await?;
        self.events
            .recent_events(project.id, RECENT_EVENTS_LIMIT)
            .await
    }

    async fn publish(&self, event: &Event) {
        let message = match serde_json::to_string(event) {
            Ok(message) => message,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Failed to serialize event for publish");
                return;
            }
        };

        if let Err(e) = self
            .broker
            .publish(&project_channel(event.project_id), message)
            .await
        {
            warn!(event_id = %event.id, project_id = %event.project_id, error = %e, "Publish failed");
        }
    }

    async fn trigger_alert_check(&self, project_id: uuid::Uuid) {
        let job = alert_check_job(project_id, self.retry_policy.clone());
        if let Err(e) = self.jobs.enqueue(job).await {
            warn!(project_id = %project_id, error = %e, "Failed to enqueue alert check");
        }
    }
}
