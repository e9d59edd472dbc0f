// Recurring job registration
//
// Bootstrap is reconciliation: every prior registration for a job name is
// removed before the single current one is added, so restarts never leave
// two triggers behind. The job name, not a generated id, is the key.

use pulseboard_core::jobs::{DIGEST_JOB, DIGEST_QUEUE, RETENTION_JOB, RETENTION_QUEUE};
use pulseboard_durable::{CronSchedule, JobStore, RepeatableJob, RetryPolicy, StoreError};
use tracing::info;

/// The recurring jobs this deployment runs
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub digest_cron: String,
    pub retention_cron: String,
    pub retry_policy: RetryPolicy,
}

impl ScheduleConfig {
    fn jobs(&self) -> [RepeatableJob; 2] {
        [
            RepeatableJob::new(DIGEST_QUEUE, DIGEST_JOB, self.digest_cron.clone())
                .with_retry_policy(self.retry_policy.clone()),
            RepeatableJob::new(RETENTION_QUEUE, RETENTION_JOB, self.retention_cron.clone())
                .with_retry_policy(self.retry_policy.clone()),
        ]
    }
}

/// Replace the digest and retention registrations with exactly one each.
///
/// Any failure is returned; callers treat it as fatal to startup.
pub async fn bootstrap_schedules(
    store: &dyn JobStore,
    config: &ScheduleConfig,
) -> Result<(), StoreError> {
    let jobs = config.jobs();

    // Reject bad expressions before touching existing registrations
    for job in &jobs {
        CronSchedule::parse(&job.cron)?;
    }

    for job in jobs {
        let removed = store.remove_repeatables(&job.queue, &job.name).await?;
        let (queue, name, cron) = (job.queue.clone(), job.name.clone(), job.cron.clone());
        store.add_repeatable(job).await?;
        info!(%queue, %name, %cron, removed, "Recurring job registered");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulseboard_durable::InMemoryJobStore;

    fn config() -> ScheduleConfig {
        ScheduleConfig {
            digest_cron: "0 0 * * *".to_string(),
            retention_cron: "0 2 * * *".to_string(),
            retry_policy: RetryPolicy::exponential(),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_twice_leaves_one_registration_each() {
        let store = InMemoryJobStore::new();

        bootstrap_schedules(&store, &config()).await.unwrap();
        bootstrap_schedules(&store, &config()).await.unwrap();

        let digest = store.list_repeatables(DIGEST_QUEUE).await.unwrap();
        assert_eq!(digest.len(), 1);
        assert_eq!(digest[0].name, DIGEST_JOB);
        assert_eq!(digest[0].cron, "0 0 * * *");

        let retention = store.list_repeatables(RETENTION_QUEUE).await.unwrap();
        assert_eq!(retention.len(), 1);
        assert_eq!(retention[0].name, RETENTION_JOB);
    }

    #[tokio::test]
    async fn test_bootstrap_replaces_changed_cron() {
        let store = InMemoryJobStore::new();
        bootstrap_schedules(&store, &config()).await.unwrap();

        let mut changed = config();
        changed.digest_cron = "30 6 * * *".to_string();
        bootstrap_schedules(&store, &changed).await.unwrap();

        let digest = store.list_repeatables(DIGEST_QUEUE).await.unwrap();
        assert_eq!(digest.len(), 1);
        assert_eq!(digest[0].cron, "30 6 * * *");
    }

    #[tokio::test]
    async fn test_invalid_cron_fails_without_touching_registrations() {
        let store = InMemoryJobStore::new();
        bootstrap_schedules(&store, &config()).await.unwrap();

        let mut broken = config();
        broken.retention_cron = "not a cron".to_string();
        let err = bootstrap_schedules(&store, &broken).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidSchedule(_)));

        assert_eq!(store.list_repeatables(DIGEST_QUEUE).await.unwrap().len(), 1);
        assert_eq!(store.list_repeatables(RETENTION_QUEUE).await.unwrap().len(), 1);
    }
}
