//! Worker registry records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A worker's registration record. Mutated only by the owning worker:
/// registered at startup, heartbeated every loop iteration, marked stopped
/// on orderly exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Unique per worker instance: `"{pid}-{index}-{random8}"`.
    pub id: String,
    pub pid: u32,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl WorkerInfo {
    pub fn new(id: impl Into<String>, pid: u32, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            pid,
            name: name.into(),
            started_at: now,
            last_heartbeat: now,
            stopped_at: None,
        }
    }

    /// A worker is active iff it has not stopped and its heartbeat is within
    /// the staleness window.
    pub fn is_active(&self, stale_after: Duration, now: DateTime<Utc>) -> bool {
        self.stopped_at.is_none() && now - self.last_heartbeat <= stale_after
    }
}
