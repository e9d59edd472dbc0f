// Worker runtime tests against in-memory storage and job store

use std::sync::Arc;
use std::time::Duration;

use pulseboard_core::jobs::{ALERTS_QUEUE, DIGEST_QUEUE, RETENTION_QUEUE};
use pulseboard_core::{EventStore, EventType, NewEvent};
use pulseboard_durable::{
    InMemoryJobStore, JobStatus, JobStore, NewJob, PollerConfig, RetryPolicy,
};
use pulseboard_storage::models::{CreateProjectRow, CreateUserRow};
use pulseboard_storage::StorageBackend;
use pulseboard_worker::{alert_check_job, RecordingMailer, WorkerConfig, WorkerRuntime};
use uuid::Uuid;

struct Harness {
    storage: Arc<StorageBackend>,
    jobs: Arc<InMemoryJobStore>,
    mailer: Arc<RecordingMailer>,
    project_id: Uuid,
}

async fn harness() -> Harness {
    let storage = Arc::new(StorageBackend::in_memory());
    let user = storage
        .create_user(CreateUserRow {
            email: "owner@example.com".to_string(),
            name: "Owner".to_string(),
        })
        .await
        .unwrap();
    let project = storage
        .create_project(CreateProjectRow {
            name: "Storefront".to_string(),
            api_key: "pb_storefront".to_string(),
            owner_user_id: user.id,
        })
        .await
        .unwrap();

    Harness {
        storage,
        jobs: Arc::new(InMemoryJobStore::new()),
        mailer: Arc::new(RecordingMailer::new()),
        project_id: project.id,
    }
}

fn fast_poller() -> PollerConfig {
    PollerConfig {
        min_interval: Duration::from_millis(5),
        max_interval: Duration::from_millis(20),
        ..PollerConfig::default()
    }
}

impl Harness {
    fn runtime(&self, config: &WorkerConfig) -> WorkerRuntime {
        WorkerRuntime::with_poller(
            self.jobs.clone(),
            self.storage.clone(),
            self.storage.clone(),
            self.mailer.clone(),
            config,
            fast_poller(),
        )
    }

    async fn wait_for(&self, queue: &str, status: JobStatus, count: usize) {
        for _ in 0..200 {
            if self.jobs.count_by_status(queue, status) >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {count} {status} job(s) on {queue}");
    }
}

#[tokio::test]
async fn test_three_errors_with_threshold_three_send_one_alert() {
    let h = harness().await;
    let config = WorkerConfig {
        alert_threshold: 3,
        ..WorkerConfig::default()
    };

    for i in 0..3 {
        h.storage
            .insert_event(NewEvent::new(
                h.project_id,
                EventType::Error,
                format!("TypeError {i}"),
                None,
                None,
            ))
            .await
            .unwrap();
        h.jobs
            .enqueue(alert_check_job(h.project_id, config.retry_policy.clone()))
            .await
            .unwrap();
    }

    let runtime = h.runtime(&config);
    runtime.start().await.unwrap();
    h.wait_for(ALERTS_QUEUE, JobStatus::Completed, 1).await;
    runtime.shutdown().await.unwrap();

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "owner@example.com");
    assert!(sent[0].subject.contains("Storefront"));
    assert!(sent[0].html.contains("<strong>3</strong>"));
}

#[tokio::test]
async fn test_failed_alert_is_retried_then_dead() {
    let h = harness().await;
    h.mailer.fail_for("owner@example.com");
    let config = WorkerConfig {
        alert_threshold: 0,
        retry_policy: RetryPolicy::fixed(Duration::from_millis(5), 2),
        ..WorkerConfig::default()
    };

    let job_id = h
        .jobs
        .enqueue(alert_check_job(h.project_id, config.retry_policy.clone()))
        .await
        .unwrap()
        .job_id();

    let runtime = h.runtime(&config);
    runtime.start().await.unwrap();
    h.wait_for(ALERTS_QUEUE, JobStatus::Dead, 1).await;
    runtime.shutdown().await.unwrap();

    let info = h.jobs.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(info.attempt, 2);
    assert!(info.last_error.unwrap_or_default().contains("rejected"));
}

#[tokio::test]
async fn test_malformed_alert_payload_is_dead_lettered_at_once() {
    let h = harness().await;
    let config = WorkerConfig {
        retry_policy: RetryPolicy::fixed(Duration::from_millis(5), 5),
        ..WorkerConfig::default()
    };

    let job_id = h
        .jobs
        .enqueue(
            NewJob::new(
                ALERTS_QUEUE,
                "alert-check",
                serde_json::json!({ "projectId": "not-a-uuid" }),
            )
            .with_retry_policy(config.retry_policy.clone()),
        )
        .await
        .unwrap()
        .job_id();

    let runtime = h.runtime(&config);
    runtime.start().await.unwrap();
    h.wait_for(ALERTS_QUEUE, JobStatus::Dead, 1).await;
    runtime.shutdown().await.unwrap();

    let info = h.jobs.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(info.attempt, 1);
    assert!(info
        .last_error
        .unwrap_or_default()
        .starts_with("invalid alert payload"));
    assert!(h.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_recurring_jobs_are_registered_on_start() {
    let h = harness().await;
    let runtime = h.runtime(&WorkerConfig::default());

    runtime.start().await.unwrap();
    runtime.shutdown().await.unwrap();
    runtime.start().await.unwrap();
    runtime.shutdown().await.unwrap();

    assert_eq!(h.jobs.list_repeatables(DIGEST_QUEUE).await.unwrap().len(), 1);
    assert_eq!(h.jobs.list_repeatables(RETENTION_QUEUE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_bad_cron_aborts_start() {
    let h = harness().await;
    let config = WorkerConfig {
        digest_cron: "every night".to_string(),
        ..WorkerConfig::default()
    };

    let runtime = h.runtime(&config);
    assert!(runtime.start().await.is_err());
    assert_eq!(
        runtime.status(),
        pulseboard_durable::WorkerPoolStatus::Stopped
    );
}
