//! Recurring job promotion
//!
//! Recurring registrations live in the store; this ticker turns the ones that
//! are due into ordinary jobs. Several processes may run it concurrently, the
//! store guarantees each slot fires once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::persistence::{JobStore, StoreError};

pub struct RepeatScheduler {
    store: Arc<dyn JobStore>,
    tick_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RepeatScheduler {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            tick_interval: Duration::from_secs(1),
            shutdown_tx,
            handle: Mutex::new(None),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Promote everything due at `now`
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let promoted = self.store.promote_due_repeatables(now).await?;
        if !promoted.is_empty() {
            info!(count = promoted.len(), "Recurring jobs enqueued");
        }
        Ok(promoted)
    }

    /// Start ticking in the background. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return;
        }

        self.shutdown_tx.send_replace(false);
        let store = Arc::clone(&self.store);
        let interval = self.tick_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match store.promote_due_repeatables(Utc::now()).await {
                            Ok(promoted) if !promoted.is_empty() => {
                                info!(count = promoted.len(), "Recurring jobs enqueued");
                            }
                            Ok(_) => {}
                            Err(e) => error!("Failed to promote recurring jobs: {}", e),
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            debug!("Repeat scheduler exited");
        }));
    }

    /// Stop ticking and wait for the loop to exit
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{InMemoryJobStore, JobStatus, RepeatableJob};

    #[tokio::test]
    async fn test_tick_promotes_due_registrations() {
        let store = Arc::new(InMemoryJobStore::new());
        store
            .add_repeatable(RepeatableJob::new("digest", "nightly-digest", "0 0 * * *"))
            .await
            .unwrap();
        let next = store.list_repeatables("digest").await.unwrap()[0].next_run_at;

        let scheduler = RepeatScheduler::new(store.clone());
        assert!(scheduler.tick(Utc::now()).await.unwrap().is_empty());
        assert_eq!(scheduler.tick(next).await.unwrap().len(), 1);
        assert_eq!(store.count_by_status("digest", JobStatus::Pending), 1);
    }

    #[tokio::test]
    async fn test_background_loop_fires_every_second_schedule() {
        let store = Arc::new(InMemoryJobStore::new());
        store
            .add_repeatable(RepeatableJob::new("retention", "data-retention", "* * * * * *"))
            .await
            .unwrap();

        let scheduler =
            RepeatScheduler::new(store.clone()).with_tick_interval(Duration::from_millis(50));
        scheduler.start();
        scheduler.start();

        for _ in 0..60 {
            if store.count_by_status("retention", JobStatus::Pending) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        scheduler.shutdown().await;

        assert!(store.count_by_status("retention", JobStatus::Pending) >= 1);
        scheduler.shutdown().await;
    }
}
