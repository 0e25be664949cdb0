//! Queue Worker - Execution runtime for the queuectl job queue
//!
//! This crate layers the execution policy over the durable store:
//! - `QueueManager`: enqueue validation, subprocess execution with
//!   timeout-bounded output capture, the retry/DLQ transition policy,
//!   retry promotion and manual DLQ reanimation
//! - `Worker`: the long-running loop (heartbeat, reap, promote, claim,
//!   execute) with cooperative watch-channel shutdown
//! - `WorkerPool`: spawns N workers, wires signal-driven shutdown, joins
//!   with a bounded wait
//! - `metrics` / `health`: Prometheus gauges refreshed from the store and
//!   the axum endpoint that exposes them
//!
//! # Architecture
//!
//! ```text
//! enqueue (CLI) ---------------------+
//!                                    v
//!                              queue-store (SQLite)
//!                                    ^
//! WorkerPool -> Worker loop ---------+
//!                 |  claim / promote / reap / heartbeat
//!                 v
//!          QueueManager::execute -> sh -c <command> (timeout-bounded)
//! ```

mod error;
mod executor;
mod health;
mod manager;
pub mod metrics;
mod pool;
mod worker;

pub use error::{QueueError, QueueResult};
pub use executor::{ExecOutcome, ExecReport, run_command};
pub use health::{HealthState, health_handler, health_router, metrics_handler};
pub use manager::QueueManager;
pub use pool::{WorkerPool, shutdown_signal};
pub use worker::Worker;
