//! Worker pool for job execution
//!
//! Runs registered handlers for a set of queues with bounded concurrency and
//! graceful shutdown. Every claimed job ends in exactly one of
//! `complete_job` or `fail_job`; a handler that panics counts as a failure.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::poller::{JobPoller, PollerConfig, PollerError};
use crate::persistence::{ClaimedJob, JobFailureOutcome, JobStore, StoreError};

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Unique worker ID (generated if not provided)
    pub worker_id: String,

    /// Queues this pool consumes
    pub queues: Vec<String>,

    /// Maximum concurrent job executions
    pub max_concurrency: usize,

    /// Poller configuration
    pub poller: PollerConfig,

    /// Stale job reclamation interval
    pub stale_reclaim_interval: Duration,

    /// How long a claim may last before the job is handed out again
    pub stale_threshold: Duration,

    /// Completed jobs older than this are purged by the reclaim loop
    pub completed_retention: Duration,

    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::now_v7()),
            queues: vec![],
            max_concurrency: 10,
            poller: PollerConfig::default(),
            stale_reclaim_interval: Duration::from_secs(30),
            stale_threshold: Duration::from_secs(300),
            completed_retention: Duration::from_secs(24 * 60 * 60),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerPoolConfig {
    pub fn new(queues: Vec<String>) -> Self {
        Self {
            queues,
            ..Default::default()
        }
    }

    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_poller(mut self, config: PollerConfig) -> Self {
        self.poller = config;
        self
    }

    pub fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = threshold;
        self
    }

    pub fn with_completed_retention(mut self, retention: Duration) -> Self {
        self.completed_retention = retention;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Worker pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolStatus {
    /// Running and claiming jobs
    Running,
    /// Finishing in-flight jobs, not claiming new ones
    Draining,
    /// Stopped
    Stopped,
}

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("poller error: {0}")]
    Poller(#[from] PollerError),

    #[error("worker pool is already running")]
    AlreadyRunning,

    #[error("graceful shutdown timed out")]
    ShutdownTimeout,

    #[error("no handler registered for queue: {0}")]
    HandlerNotFound(String),
}

/// Why a handler gave up on a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub message: String,
    /// `false` dead-letters the job without spending its remaining attempts
    pub retryable: bool,
}

impl JobFailure {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<String> for JobFailure {
    fn from(message: String) -> Self {
        Self::retryable(message)
    }
}

impl From<&str> for JobFailure {
    fn from(message: &str) -> Self {
        Self::retryable(message)
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Handler result: output recorded on completion, or the failure
pub type JobResult = Result<serde_json::Value, JobFailure>;

/// Job handler function type
pub type JobHandler = Arc<
    dyn Fn(ClaimedJob) -> std::pin::Pin<Box<dyn std::future::Future<Output = JobResult> + Send>>
        + Send
        + Sync,
>;

/// Worker pool for executing jobs
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    config: WorkerPoolConfig,
    handlers: RwLock<HashMap<String, JobHandler>>,
    shutdown_tx: watch::Sender<bool>,
    status: RwLock<WorkerPoolStatus>,
    active_jobs: Arc<Semaphore>,
    loop_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(store: Arc<dyn JobStore>, config: WorkerPoolConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let active_jobs = Arc::new(Semaphore::new(config.max_concurrency));

        Self {
            store,
            config,
            handlers: RwLock::new(HashMap::new()),
            shutdown_tx,
            status: RwLock::new(WorkerPoolStatus::Stopped),
            active_jobs,
            loop_handles: Mutex::new(vec![]),
        }
    }

    /// Register the handler for a queue. Must be called before `start`.
    pub fn register_handler<F, Fut>(&self, queue: &str, handler: F)
    where
        F: Fn(ClaimedJob) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = JobResult> + Send + 'static,
    {
        let handler: JobHandler = Arc::new(move |job| Box::pin(handler(job)));
        self.handlers.write().insert(queue.to_string(), handler);
    }

    /// Start the worker pool
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn start(&self) -> Result<(), WorkerPoolError> {
        if *self.status.read() == WorkerPoolStatus::Running {
            return Err(WorkerPoolError::AlreadyRunning);
        }

        {
            let handlers = self.handlers.read();
            if let Some(missing) = self.config.queues.iter().find(|q| !handlers.contains_key(*q)) {
                return Err(WorkerPoolError::HandlerNotFound(missing.clone()));
            }
        }

        info!(
            worker_id = %self.config.worker_id,
            queues = ?self.config.queues,
            max_concurrency = self.config.max_concurrency,
            "Starting worker pool"
        );

        self.shutdown_tx.send_replace(false);
        *self.status.write() = WorkerPoolStatus::Running;

        let poll = self.start_poll_loop();
        let reclaim = self.start_reclaim_loop();
        self.loop_handles.lock().extend([poll, reclaim]);

        Ok(())
    }

    /// Stop claiming, then wait for in-flight jobs to finish
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn shutdown(&self) -> Result<(), WorkerPoolError> {
        if *self.status.read() == WorkerPoolStatus::Stopped {
            return Ok(());
        }

        info!(worker_id = %self.config.worker_id, "Initiating graceful shutdown");
        *self.status.write() = WorkerPoolStatus::Draining;
        self.shutdown_tx.send_replace(true);

        let handles: Vec<JoinHandle<()>> = self.loop_handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        loop {
            let available = self.active_jobs.available_permits();
            if available == self.config.max_concurrency {
                debug!("All jobs completed");
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(
                    remaining_jobs = self.config.max_concurrency - available,
                    "Shutdown timeout reached"
                );
                *self.status.write() = WorkerPoolStatus::Stopped;
                return Err(WorkerPoolError::ShutdownTimeout);
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        *self.status.write() = WorkerPoolStatus::Stopped;
        info!(worker_id = %self.config.worker_id, "Worker pool stopped");
        Ok(())
    }

    pub fn status(&self) -> WorkerPoolStatus {
        *self.status.read()
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Jobs currently executing
    pub fn current_load(&self) -> usize {
        self.config.max_concurrency - self.active_jobs.available_permits()
    }

    fn start_poll_loop(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        let handlers = self.handlers.read().clone();
        let active_jobs = Arc::clone(&self.active_jobs);
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut poller = JobPoller::new(
                Arc::clone(&store),
                config.worker_id.clone(),
                config.queues.clone(),
                config.poller.clone(),
                shutdown_rx,
            );

            loop {
                if poller.is_shutdown() {
                    break;
                }

                let available = active_jobs.available_permits();
                if available == 0 {
                    if poller.wait().await {
                        break;
                    }
                    continue;
                }

                match poller.poll(available).await {
                    Ok(jobs) => {
                        for job in jobs {
                            let Some(handler) = handlers.get(&job.queue).cloned() else {
                                // Only configured queues are claimed and all of them have
                                // handlers; treat a mismatch as a failed attempt
                                let _ = store.fail_job(job.id, "no handler registered").await;
                                continue;
                            };

                            let permit = match Arc::clone(&active_jobs).try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    // Claimed beyond capacity; hand it back as a retry
                                    let _ = store.fail_job(job.id, "worker at capacity").await;
                                    continue;
                                }
                            };

                            let store = Arc::clone(&store);
                            tokio::spawn(async move {
                                execute_job(store, handler, job).await;
                                drop(permit);
                            });
                        }
                    }
                    Err(e) => {
                        error!("Poll error: {}", e);
                    }
                }

                if poller.wait().await {
                    break;
                }
            }

            debug!("Poll loop exited");
        })
    }

    fn start_reclaim_loop(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let interval = self.config.stale_reclaim_interval;
        let threshold = self.config.stale_threshold;
        let retention = self.config.completed_retention;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match store.reclaim_stale_jobs(threshold).await {
                            Ok(reclaimed) if !reclaimed.is_empty() => {
                                info!(count = reclaimed.len(), "Reclaimed stale jobs");
                            }
                            Ok(_) => {}
                            Err(e) => error!("Stale job reclamation failed: {}", e),
                        }
                        match store.purge_completed_jobs(retention).await {
                            Ok(0) => {}
                            Ok(purged) => debug!(purged, "Purged completed jobs"),
                            Err(e) => error!("Completed job purge failed: {}", e),
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            debug!("Reclaim loop exited");
        })
    }
}

/// Run one job and report its outcome to the store
async fn execute_job(store: Arc<dyn JobStore>, handler: JobHandler, job: ClaimedJob) {
    let job_id = job.id;
    let queue = job.queue.clone();
    let name = job.name.clone();
    let attempt = job.attempt;

    let result = match AssertUnwindSafe(handler(job)).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(JobFailure::retryable("job handler panicked")),
    };

    match result {
        Ok(output) => {
            debug!(%job_id, %queue, %name, attempt, "Job completed");
            if let Err(e) = store.complete_job(job_id, output).await {
                error!(%job_id, "Failed to complete job: {}", e);
            }
        }
        Err(JobFailure {
            message,
            retryable: false,
        }) => match store.kill_job(job_id, &message).await {
            Ok(()) => {
                error!(
                    %job_id, %queue, %name, attempt,
                    error = %message,
                    "Job failed with a non-retryable error"
                );
            }
            Err(e) => {
                error!(%job_id, "Failed to record job failure: {}", e);
            }
        },
        Err(JobFailure { message, .. }) => match store.fail_job(job_id, &message).await {
            Ok(JobFailureOutcome::WillRetry {
                next_attempt,
                delay,
            }) => {
                warn!(
                    %job_id, %queue, %name, attempt, next_attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Job failed, retry scheduled"
                );
            }
            Ok(JobFailureOutcome::Dead) => {
                error!(
                    %job_id, %queue, %name, attempt,
                    error = %message,
                    "Job failed permanently"
                );
            }
            Err(e) => {
                error!(%job_id, "Failed to record job failure: {}", e);
            }
        },
    }
}
