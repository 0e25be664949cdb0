//! Queue Store - Durable SQLite persistence for queuectl
//!
//! The store is the sole arbiter of durable state and the only component
//! that serializes concurrent mutations:
//! - Job rows with an atomic CAS-by-state claim primitive
//! - The retry index scan feeding promotion
//! - The stale-claim reaper that recovers jobs abandoned by dead workers
//! - The worker registry (register / heartbeat / stop)
//! - The config side-table (one row per field, JSON-encoded values)
//! - Metric aggregation queries for the Prometheus endpoint
//!
//! A `Store` wraps its own connection pool to a single SQLite file; workers
//! each open their own `Store` so no handle is shared across tasks. Older
//! database files are upgraded on open by adding missing columns before the
//! indexes that reference them are created.

mod config;
mod error;
mod registry;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::Store;
