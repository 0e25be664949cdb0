//! The worker: a long-lived cooperative task draining the queue.
//!
//! Each worker owns its own store handle. One loop iteration: heartbeat,
//! periodic stale-claim reap, retry promotion, claim, execute. After
//! executing a job the loop continues immediately (drain mode); with
//! nothing claimed it sleeps for the poll interval. The shutdown flag is
//! observed only between steps, so a running job always finishes or times
//! out.

use std::time::{Duration as StdDuration, Instant};

use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use queue_core::{QueueConfig, WorkerInfo};
use queue_store::Store;

use crate::error::QueueResult;
use crate::manager::QueueManager;

/// How often a worker runs the stale-claim reaper.
const REAP_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// Pause after an unexpected loop error before continuing.
const ERROR_BACKOFF: StdDuration = StdDuration::from_secs(1);

/// A single queue worker.
pub struct Worker {
    id: String,
    index: usize,
    store: Store,
    manager: QueueManager,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    /// Create a worker over its own store handle. The id is unique per
    /// instance: `"{pid}-{index}-{random8}"`.
    pub fn new(index: usize, store: Store, shutdown: watch::Receiver<bool>) -> Self {
        let id = format!(
            "{}-{}-{}",
            std::process::id(),
            index,
            &Uuid::new_v4().to_string()[..8]
        );
        let manager = QueueManager::new(store.clone());
        Self {
            id,
            index,
            store,
            manager,
            shutdown,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run until the shutdown flag flips.
    pub async fn run(mut self) {
        info!(worker_id = %self.id, "Worker started");

        let info = WorkerInfo::new(
            self.id.clone(),
            std::process::id(),
            format!("worker-{}", self.index),
        );
        if let Err(err) = self.store.register_worker(&info).await {
            error!(worker_id = %self.id, error = %err, "Failed to register worker");
        }

        let config = match self.store.config().await {
            Ok(config) => config,
            Err(err) => {
                warn!(worker_id = %self.id, error = %err, "Failed to load config, using defaults");
                QueueConfig::default()
            }
        };
        let poll_interval = StdDuration::from_secs_f64(config.worker_poll_interval.max(0.0));

        self.reap(&config).await;
        let mut last_reap = Instant::now();

        while !*self.shutdown.borrow() {
            // Heartbeat is best-effort; a failed beat never kills the loop.
            if let Err(err) = self.store.heartbeat_worker(&self.id).await {
                warn!(worker_id = %self.id, error = %err, "Heartbeat failed");
            }

            if last_reap.elapsed() >= REAP_INTERVAL {
                self.reap(&config).await;
                last_reap = Instant::now();
            }

            match self.tick().await {
                // Drain mode: a job was executed, claim again immediately.
                Ok(true) => {}
                Ok(false) => self.idle(poll_interval).await,
                Err(err) => {
                    error!(worker_id = %self.id, error = %err, "Worker loop error");
                    self.idle(ERROR_BACKOFF).await;
                }
            }
        }

        if let Err(err) = self.store.stop_worker(&self.id).await {
            warn!(worker_id = %self.id, error = %err, "Failed to mark worker stopped");
        }
        info!(worker_id = %self.id, "Worker stopped");
    }

    /// Promote due retries, then claim and execute at most one job.
    /// Returns whether a job was executed.
    async fn tick(&self) -> QueueResult<bool> {
        self.manager.promote_retries().await?;

        let Some(mut job) = self.manager.claim_next().await? else {
            return Ok(false);
        };
        info!(worker_id = %self.id, job_id = %job.id, "Picked up job");
        self.manager.execute(&mut job).await?;
        Ok(true)
    }

    async fn reap(&self, config: &QueueConfig) {
        match self.store.reset_stale_processing(config.stale_after()).await {
            Ok(count) if count > 0 => {
                info!(worker_id = %self.id, count, "Reset stale processing jobs");
            }
            Ok(_) => {}
            Err(err) => warn!(worker_id = %self.id, error = %err, "Stale job reaper failed"),
        }
    }

    async fn idle(&mut self, duration: StdDuration) {
        tokio::select! {
            _ = self.shutdown.changed() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}
