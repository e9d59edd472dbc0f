// Worker runtime
//
// Wires the three workers into one WorkerPool and runs the RepeatScheduler
// next to it. The control-plane embeds this in dev mode; the standalone
// binary runs it against PostgreSQL.

use std::sync::Arc;

use anyhow::Context;
use pulseboard_core::jobs::{AlertJob, ALERTS_QUEUE, DIGEST_QUEUE, RETENTION_QUEUE};
use pulseboard_core::{EventStore, Mailer, ProjectDirectory};
use pulseboard_durable::{
    JobFailure, JobResult, JobStore, PollerConfig, RepeatScheduler, WorkerPool, WorkerPoolConfig,
    WorkerPoolStatus,
};
use serde::Serialize;
use tracing::info;

use crate::alert::AlertWorker;
use crate::config::WorkerConfig;
use crate::digest::DigestWorker;
use crate::retention::RetentionWorker;
use crate::scheduler::{bootstrap_schedules, ScheduleConfig};

pub struct WorkerRuntime {
    store: Arc<dyn JobStore>,
    pool: WorkerPool,
    scheduler: RepeatScheduler,
    schedules: ScheduleConfig,
}

impl WorkerRuntime {
    pub fn new(
        store: Arc<dyn JobStore>,
        events: Arc<dyn EventStore>,
        projects: Arc<dyn ProjectDirectory>,
        mailer: Arc<dyn Mailer>,
        config: &WorkerConfig,
    ) -> Self {
        Self::with_poller(store, events, projects, mailer, config, PollerConfig::default())
    }

    pub fn with_poller(
        store: Arc<dyn JobStore>,
        events: Arc<dyn EventStore>,
        projects: Arc<dyn ProjectDirectory>,
        mailer: Arc<dyn Mailer>,
        config: &WorkerConfig,
        poller: PollerConfig,
    ) -> Self {
        let pool_config = WorkerPoolConfig::new(vec![
            ALERTS_QUEUE.to_string(),
            DIGEST_QUEUE.to_string(),
            RETENTION_QUEUE.to_string(),
        ])
        .with_worker_id(config.worker_id.clone())
        .with_max_concurrency(config.concurrency)
        .with_poller(poller);

        let pool = WorkerPool::new(Arc::clone(&store), pool_config);

        let alert = Arc::new(
            AlertWorker::new(Arc::clone(&events), Arc::clone(&projects), Arc::clone(&mailer))
                .with_threshold(config.alert_threshold)
                .with_window(config.alert_window),
        );
        pool.register_handler(ALERTS_QUEUE, move |job| {
            let alert = Arc::clone(&alert);
            async move {
                let payload: AlertJob = serde_json::from_value(job.payload)
                    .map_err(|e| JobFailure::permanent(format!("invalid alert payload: {e}")))?;
                to_result(alert.check(payload).await)
            }
        });

        let digest = Arc::new(DigestWorker::new(
            Arc::clone(&events),
            Arc::clone(&projects),
            mailer,
        ));
        pool.register_handler(DIGEST_QUEUE, move |_job| {
            let digest = Arc::clone(&digest);
            async move { to_result(digest.run().await) }
        });

        let retention = Arc::new(RetentionWorker::new(events, config.retention_days));
        pool.register_handler(RETENTION_QUEUE, move |_job| {
            let retention = Arc::clone(&retention);
            async move { to_result(retention.run().await) }
        });

        Self {
            scheduler: RepeatScheduler::new(Arc::clone(&store)),
            store,
            pool,
            schedules: ScheduleConfig {
                digest_cron: config.digest_cron.clone(),
                retention_cron: config.retention_cron.clone(),
                retry_policy: config.retry_policy.clone(),
            },
        }
    }

    /// Register recurring jobs, then start consuming. A registration failure
    /// aborts before any worker runs.
    pub async fn start(&self) -> anyhow::Result<()> {
        bootstrap_schedules(self.store.as_ref(), &self.schedules)
            .await
            .context("Failed to register recurring jobs")?;

        self.pool
            .start()
            .await
            .context("Failed to start worker pool")?;
        self.scheduler.start();

        info!(worker_id = %self.pool.worker_id(), "Worker runtime started");
        Ok(())
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.scheduler.shutdown().await;
        self.pool
            .shutdown()
            .await
            .context("Worker pool did not drain")?;
        info!("Worker runtime stopped");
        Ok(())
    }

    pub fn status(&self) -> WorkerPoolStatus {
        self.pool.status()
    }
}

/// Transient failures go back to the queue; the rest are dead-lettered at once
fn to_result<T: Serialize>(result: pulseboard_core::Result<T>) -> JobResult {
    let value = result.map_err(|e| JobFailure {
        message: e.to_string(),
        retryable: e.is_retryable(),
    })?;
    serde_json::to_value(value).map_err(|e| JobFailure::permanent(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulseboard_core::PulseError;

    #[test]
    fn test_to_result_classifies_failures() {
        let failure = to_result::<()>(Err(PulseError::delivery("mail API returned 503"))).unwrap_err();
        assert!(failure.retryable);
        assert_eq!(failure.message, "Delivery failed: mail API returned 503");

        let failure = to_result::<()>(Err(PulseError::config("bad cron"))).unwrap_err();
        assert!(!failure.retryable);

        assert_eq!(to_result(Ok(3u32)).unwrap(), serde_json::json!(3));
    }
}
