//! Queue Core - Job Model and State Machine
//!
//! Domain types shared by the queuectl store, workers and CLI:
//! - `Job` and `JobState`: the job entity and its legal state transitions
//! - `EnqueueRequest`: the JSON submission surface
//! - `QueueConfig`: runtime configuration persisted in the config side-table
//! - `WorkerInfo`: a worker's registry record
//!
//! # Job lifecycle
//!
//! ```text
//! enqueue -> pending -> processing -> completed
//!               ^            |
//!               |            +-> failed (attempts < max_retries, retry timer)
//!               |            |     |
//!               +------------+-----+  promote / reaper
//!               |
//!               +<- dead (attempts >= max_retries, manual requeue only)
//! ```

mod config;
mod job;
mod registry;
mod request;

pub use config::{ConfigError, QueueConfig};
pub use job::{Job, JobState, OUTPUT_CAP_BYTES, backoff_delay_seconds, truncate_output};
pub use registry::WorkerInfo;
pub use request::{EnqueueRequest, RequestError};
