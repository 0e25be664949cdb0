//! Worker registry operations.
//!
//! Registrations are mutated only by their owning worker: inserted at
//! startup, heartbeated every loop iteration, marked stopped on orderly
//! exit. "Active" means not stopped and heartbeated within the staleness
//! window.

use chrono::{DateTime, Duration, Utc};

use queue_core::WorkerInfo;

use crate::error::StoreResult;
use crate::store::Store;

#[derive(Debug, sqlx::FromRow)]
struct WorkerRow {
    id: String,
    pid: i64,
    name: String,
    started_at: DateTime<Utc>,
    last_heartbeat: DateTime<Utc>,
    stopped_at: Option<DateTime<Utc>>,
}

impl From<WorkerRow> for WorkerInfo {
    fn from(row: WorkerRow) -> Self {
        WorkerInfo {
            id: row.id,
            pid: row.pid as u32,
            name: row.name,
            started_at: row.started_at,
            last_heartbeat: row.last_heartbeat,
            stopped_at: row.stopped_at,
        }
    }
}

impl Store {
    /// Register a worker at startup (re-registering resets the record).
    pub async fn register_worker(&self, info: &WorkerInfo) -> StoreResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO workers (id, pid, name, started_at, last_heartbeat, stopped_at)
             VALUES (?, ?, ?, ?, ?, NULL)",
        )
        .bind(&info.id)
        .bind(info.pid as i64)
        .bind(&info.name)
        .bind(info.started_at)
        .bind(info.last_heartbeat)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Refresh a worker's heartbeat.
    pub async fn heartbeat_worker(&self, worker_id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE workers SET last_heartbeat = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(worker_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Mark a worker stopped on orderly exit.
    pub async fn stop_worker(&self, worker_id: &str) -> StoreResult<()> {
        let now = Utc::now();
        sqlx::query("UPDATE workers SET stopped_at = ?, last_heartbeat = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(worker_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Count workers with a heartbeat within `stale_after` and no
    /// `stopped_at`.
    pub async fn active_worker_count(&self, stale_after: Duration) -> StoreResult<u64> {
        let cutoff = Utc::now() - stale_after;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM workers WHERE stopped_at IS NULL AND last_heartbeat >= ?",
        )
        .bind(cutoff)
        .fetch_one(self.pool())
        .await?;
        Ok(count as u64)
    }

    /// All registrations, most recently started first.
    pub async fn list_workers(&self) -> StoreResult<Vec<WorkerInfo>> {
        let rows: Vec<WorkerRow> =
            sqlx::query_as("SELECT * FROM workers ORDER BY started_at DESC")
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().map(WorkerInfo::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> Store {
        Store::connect(dir.path().join("test.db")).await.unwrap()
    }

    #[tokio::test]
    async fn test_register_heartbeat_stop_cycle() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let info = WorkerInfo::new("42-1-deadbeef", 42, "worker-1");
        store.register_worker(&info).await.unwrap();
        assert_eq!(store.active_worker_count(Duration::seconds(10)).await.unwrap(), 1);

        store.heartbeat_worker(&info.id).await.unwrap();
        let listed = store.list_workers().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].last_heartbeat >= info.last_heartbeat);

        store.stop_worker(&info.id).await.unwrap();
        assert_eq!(store.active_worker_count(Duration::seconds(10)).await.unwrap(), 0);
        let listed = store.list_workers().await.unwrap();
        assert!(listed[0].stopped_at.is_some());
    }

    #[tokio::test]
    async fn test_stale_heartbeat_not_counted_active() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let mut info = WorkerInfo::new("42-2-deadbeef", 42, "worker-2");
        info.last_heartbeat = Utc::now() - Duration::seconds(60);
        store.register_worker(&info).await.unwrap();

        assert_eq!(store.active_worker_count(Duration::seconds(10)).await.unwrap(), 0);
        assert_eq!(store.active_worker_count(Duration::seconds(120)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reregistering_clears_stopped_at() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let info = WorkerInfo::new("42-3-deadbeef", 42, "worker-3");
        store.register_worker(&info).await.unwrap();
        store.stop_worker(&info.id).await.unwrap();

        store.register_worker(&info).await.unwrap();
        let listed = store.list_workers().await.unwrap();
        assert!(listed[0].stopped_at.is_none());
    }
}
