//! In-memory implementation of JobStore for tests and dev mode

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::store::*;
use crate::reliability::RetryPolicy;
use crate::schedule::CronSchedule;

/// Internal job state
struct JobState {
    queue: String,
    name: String,
    payload: serde_json::Value,
    retry_policy: RetryPolicy,
    dedup_key: Option<String>,
    status: JobStatus,
    attempt: u32,
    visible_at: DateTime<Utc>,
    claimed_by: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    error_history: Vec<String>,
    completed_at: Option<DateTime<Utc>>,
}

/// Completed jobs kept for inspection; older ones are evicted on completion
pub const DEFAULT_COMPLETED_HISTORY: usize = 100;

/// Internal registration state
struct RepeatableState {
    job: RepeatableJob,
    schedule: CronSchedule,
    next_run_at: DateTime<Utc>,
    last_run_at: Option<DateTime<Utc>>,
}

/// In-memory implementation of JobStore
///
/// Same semantics as the PostgreSQL implementation; all data is lost on
/// restart. At most `completed_history` completed jobs are retained.
///
/// # Example
///
/// ```
/// use pulseboard_durable::InMemoryJobStore;
///
/// let store = InMemoryJobStore::new();
/// assert_eq!(store.job_count(), 0);
/// ```
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, JobState>>,
    repeatables: RwLock<HashMap<(String, String), RepeatableState>>,
    completed_history: usize,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::with_completed_history(DEFAULT_COMPLETED_HISTORY)
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_completed_history(completed_history: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            repeatables: RwLock::new(HashMap::new()),
            completed_history,
        }
    }

    /// Drop the oldest completed jobs beyond the history limit
    fn evict_completed(jobs: &mut HashMap<Uuid, JobState>, keep: usize) {
        let mut completed: Vec<(DateTime<Utc>, Uuid)> = jobs
            .iter()
            .filter(|(_, j)| j.status == JobStatus::Completed)
            .filter_map(|(id, j)| j.completed_at.map(|at| (at, *id)))
            .collect();
        if completed.len() <= keep {
            return;
        }
        completed.sort();
        let excess = completed.len() - keep;
        for (_, id) in completed.into_iter().take(excess) {
            jobs.remove(&id);
        }
    }

    /// Total number of jobs in any status
    pub fn job_count(&self) -> usize {
        self.jobs.read().len()
    }

    /// Number of jobs in a queue with the given status
    pub fn count_by_status(&self, queue: &str, status: JobStatus) -> usize {
        self.jobs
            .read()
            .values()
            .filter(|j| j.queue == queue && j.status == status)
            .count()
    }

    fn insert_job(jobs: &mut HashMap<Uuid, JobState>, job: NewJob, now: DateTime<Utc>) -> Uuid {
        let id = Uuid::now_v7();
        jobs.insert(
            id,
            JobState {
                queue: job.queue,
                name: job.name,
                payload: job.payload,
                retry_policy: job.retry_policy,
                dedup_key: job.dedup_key,
                status: JobStatus::Pending,
                attempt: 0,
                visible_at: job.run_at.unwrap_or(now),
                claimed_by: None,
                claimed_at: None,
                last_error: None,
                error_history: vec![],
                completed_at: None,
            },
        );
        id
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: NewJob) -> Result<EnqueueOutcome, StoreError> {
        let mut jobs = self.jobs.write();

        if let Some(key) = job.dedup_key.as_deref() {
            let existing = jobs.iter().find(|(_, j)| {
                j.status == JobStatus::Pending
                    && j.attempt == 0
                    && j.queue == job.queue
                    && j.dedup_key.as_deref() == Some(key)
            });
            if let Some((id, _)) = existing {
                return Ok(EnqueueOutcome::Deduplicated(*id));
            }
        }

        Ok(EnqueueOutcome::Enqueued(Self::insert_job(
            &mut jobs,
            job,
            Utc::now(),
        )))
    }

    async fn claim_jobs(
        &self,
        worker_id: &str,
        queues: &[String],
        max_jobs: usize,
    ) -> Result<Vec<ClaimedJob>, StoreError> {
        let now = Utc::now();
        let mut jobs = self.jobs.write();

        let mut candidates: Vec<(DateTime<Utc>, Uuid)> = jobs
            .iter()
            .filter(|(_, j)| {
                j.status == JobStatus::Pending && j.visible_at <= now && queues.contains(&j.queue)
            })
            .map(|(id, j)| (j.visible_at, *id))
            .collect();
        candidates.sort();
        candidates.truncate(max_jobs);

        let mut claimed = Vec::with_capacity(candidates.len());
        for (_, id) in candidates {
            if let Some(job) = jobs.get_mut(&id) {
                job.status = JobStatus::Claimed;
                job.claimed_by = Some(worker_id.to_string());
                job.claimed_at = Some(now);
                job.attempt += 1;

                claimed.push(ClaimedJob {
                    id,
                    queue: job.queue.clone(),
                    name: job.name.clone(),
                    payload: job.payload.clone(),
                    attempt: job.attempt,
                    max_attempts: job.retry_policy.max_attempts,
                });
            }
        }

        Ok(claimed)
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        _result: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(&job_id).ok_or(StoreError::JobNotFound(job_id))?;
        job.status = JobStatus::Completed;
        job.claimed_by = None;
        job.completed_at = Some(Utc::now());
        Self::evict_completed(&mut jobs, self.completed_history);
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<JobFailureOutcome, StoreError> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(&job_id).ok_or(StoreError::JobNotFound(job_id))?;

        job.error_history.push(error.to_string());
        job.last_error = Some(error.to_string());
        job.claimed_by = None;
        job.claimed_at = None;

        if job.retry_policy.has_attempts_remaining(job.attempt) {
            let next_attempt = job.attempt + 1;
            let delay = job.retry_policy.delay_for_attempt(next_attempt);
            job.status = JobStatus::Pending;
            job.visible_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
            Ok(JobFailureOutcome::WillRetry {
                next_attempt,
                delay,
            })
        } else {
            job.status = JobStatus::Dead;
            job.completed_at = Some(Utc::now());
            Ok(JobFailureOutcome::Dead)
        }
    }

    async fn kill_job(&self, job_id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(&job_id).ok_or(StoreError::JobNotFound(job_id))?;

        job.error_history.push(error.to_string());
        job.last_error = Some(error.to_string());
        job.claimed_by = None;
        job.claimed_at = None;
        job.status = JobStatus::Dead;
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn reclaim_stale_jobs(
        &self,
        stale_threshold: Duration,
    ) -> Result<Vec<Uuid>, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(stale_threshold).unwrap_or_default();
        let mut jobs = self.jobs.write();
        let mut reclaimed = vec![];
        for (id, job) in jobs.iter_mut() {
            if job.status == JobStatus::Claimed && job.claimed_at.is_some_and(|at| at < cutoff) {
                job.status = JobStatus::Pending;
                job.claimed_by = None;
                job.claimed_at = None;
                reclaimed.push(*id);
            }
        }
        Ok(reclaimed)
    }

    async fn purge_completed_jobs(&self, older_than: Duration) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_default();
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, j| {
            !(j.status == JobStatus::Completed && j.completed_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - jobs.len()) as u64)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<JobInfo>, StoreError> {
        Ok(self.jobs.read().get(&job_id).map(|j| JobInfo {
            id: job_id,
            queue: j.queue.clone(),
            name: j.name.clone(),
            status: j.status,
            attempt: j.attempt,
            max_attempts: j.retry_policy.max_attempts,
            last_error: j.last_error.clone(),
            visible_at: j.visible_at,
        }))
    }

    async fn list_dead_jobs(
        &self,
        queue: &str,
        pagination: Pagination,
    ) -> Result<Vec<DeadJob>, StoreError> {
        let jobs = self.jobs.read();
        let mut dead: Vec<DeadJob> = jobs
            .iter()
            .filter(|(_, j)| j.status == JobStatus::Dead && j.queue == queue)
            .map(|(id, j)| DeadJob {
                id: *id,
                queue: j.queue.clone(),
                name: j.name.clone(),
                payload: j.payload.clone(),
                attempts: j.attempt,
                last_error: j.last_error.clone().unwrap_or_default(),
                error_history: j.error_history.clone(),
                dead_at: j.completed_at.unwrap_or(j.visible_at),
            })
            .collect();
        dead.sort_by(|a, b| b.dead_at.cmp(&a.dead_at));

        Ok(dead
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect())
    }

    async fn add_repeatable(&self, job: RepeatableJob) -> Result<(), StoreError> {
        let schedule = CronSchedule::parse(&job.cron)?;
        let next_run_at = schedule.next_after(Utc::now()).ok_or_else(|| {
            StoreError::InvalidSchedule(format!("'{}' never fires", job.cron))
        })?;

        self.repeatables.write().insert(
            (job.queue.clone(), job.name.clone()),
            RepeatableState {
                job,
                schedule,
                next_run_at,
                last_run_at: None,
            },
        );
        Ok(())
    }

    async fn remove_repeatables(&self, queue: &str, name: &str) -> Result<u64, StoreError> {
        let removed = self
            .repeatables
            .write()
            .remove(&(queue.to_string(), name.to_string()));
        Ok(u64::from(removed.is_some()))
    }

    async fn list_repeatables(&self, queue: &str) -> Result<Vec<RepeatableInfo>, StoreError> {
        let mut list: Vec<RepeatableInfo> = self
            .repeatables
            .read()
            .values()
            .filter(|r| r.job.queue == queue)
            .map(|r| RepeatableInfo {
                queue: r.job.queue.clone(),
                name: r.job.name.clone(),
                cron: r.job.cron.clone(),
                next_run_at: r.next_run_at,
                last_run_at: r.last_run_at,
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn promote_due_repeatables(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let mut repeatables = self.repeatables.write();
        let mut jobs = self.jobs.write();
        let mut enqueued = vec![];

        // Schedules that never fire again are dropped after their last run
        repeatables.retain(|_, state| {
            if state.next_run_at > now {
                return true;
            }
            let job = NewJob::new(&state.job.queue, &state.job.name, state.job.payload.clone())
                .with_retry_policy(state.job.retry_policy.clone());
            enqueued.push(Self::insert_job(&mut jobs, job, now));

            state.last_run_at = Some(now);
            match state.schedule.next_after(now) {
                Some(next) => {
                    state.next_run_at = next;
                    true
                }
                None => false,
            }
        });

        Ok(enqueued)
    }
}
