//! The worker pool supervisor.
//!
//! Spawns N workers, each over its own store handle, and owns their
//! lifetimes. Shutdown is cooperative: a shared watch flag flipped either
//! by a signal or by [`WorkerPool::stop`], observed by workers between loop
//! steps. Stop joins each worker with a bounded wait and abandons any that
//! exceed it; the stale-claim reaper recovers whatever such a worker held.

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use queue_store::Store;

use crate::error::QueueResult;
use crate::worker::Worker;

/// Bound on joining each worker during shutdown.
const JOIN_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Supervises a set of queue workers.
pub struct WorkerPool {
    db_path: PathBuf,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    running: bool,
}

impl WorkerPool {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            db_path: db_path.into(),
            shutdown_tx,
            handles: Vec::new(),
            running: false,
        }
    }

    /// Spawn `count` workers, each with its own store handle. Calling this
    /// while running is a no-op warning.
    pub async fn start(&mut self, count: usize) -> QueueResult<()> {
        if self.running {
            warn!("Workers already running");
            return Ok(());
        }

        info!(count, "Starting workers");
        self.shutdown_tx.send_replace(false);

        for index in 1..=count {
            let store = Store::connect(&self.db_path).await?;
            let worker = Worker::new(index, store, self.shutdown_tx.subscribe());
            self.handles.push(tokio::spawn(worker.run()));
        }

        self.running = true;
        info!(count, "Workers started");
        Ok(())
    }

    /// Flip the stop flag and join each worker with a bounded wait. Calling
    /// this while stopped is a no-op.
    pub async fn stop(&mut self) {
        if !self.running {
            return;
        }

        info!("Stopping workers gracefully (finishing current jobs)");
        self.shutdown_tx.send_replace(true);

        for handle in self.handles.drain(..) {
            if tokio::time::timeout(JOIN_TIMEOUT, handle).await.is_err() {
                warn!("Worker did not stop within the join bound, abandoning it");
            }
        }

        self.running = false;
        info!("All workers stopped");
    }

    /// Convenience wrapper for the CLI: start `count` workers, block until
    /// SIGINT/SIGTERM, then stop.
    pub async fn run_until_shutdown(&mut self, count: usize) -> QueueResult<()> {
        self.start(count).await?;
        shutdown_signal().await;
        self.stop().await;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }
}
