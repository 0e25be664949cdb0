//! The SQLite store: schema management, job persistence, the atomic claim
//! primitive, the retry index scan, the stale-claim reaper and the metric
//! aggregation queries.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use strum::IntoEnumIterator;
use tracing::debug;

use queue_core::{Job, JobState};

use crate::error::{StoreError, StoreResult};

/// Columns added after the first schema version. They are created on open
/// when missing, before the indexes that reference them.
const EVOLVED_JOB_COLUMNS: &[(&str, &str)] = &[
    ("priority", "INTEGER DEFAULT 0"),
    ("run_at", "TEXT"),
    ("timeout_seconds", "INTEGER"),
    ("last_stdout", "TEXT"),
    ("last_stderr", "TEXT"),
    ("duration_ms", "INTEGER"),
];

const JOB_COLUMNS: &str = "id, command, state, attempts, max_retries, created_at, updated_at, \
     error_message, next_retry_at, completed_at, priority, run_at, \
     timeout_seconds, last_stdout, last_stderr, duration_ms";

/// Handle to the SQLite-backed job store.
///
/// Cloning shares the underlying pool; workers instead open their own
/// `Store` via [`Store::connect`] so each task owns its handle.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

/// Database row model for `jobs`, mapped into the domain [`Job`].
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    command: String,
    state: String,
    attempts: i64,
    max_retries: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    error_message: Option<String>,
    next_retry_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    priority: i64,
    run_at: Option<DateTime<Utc>>,
    timeout_seconds: Option<i64>,
    last_stdout: Option<String>,
    last_stderr: Option<String>,
    duration_ms: Option<i64>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse::<JobState>()
            .map_err(|_| StoreError::InvalidState(row.state.clone()))?;
        Ok(Job {
            id: row.id,
            command: row.command,
            state,
            attempts: row.attempts as u32,
            max_retries: row.max_retries as u32,
            priority: row.priority,
            run_at: row.run_at,
            timeout_seconds: row.timeout_seconds.map(|t| t as u64),
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
            next_retry_at: row.next_retry_at,
            error_message: row.error_message,
            last_stdout: row.last_stdout,
            last_stderr: row.last_stderr,
            duration_ms: row.duration_ms.map(|d| d as u64),
        })
    }
}

impl Store {
    /// Open (creating if missing) the database file and bring its schema up
    /// to date.
    pub async fn connect(path: impl AsRef<Path>) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(StdDuration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                command TEXT NOT NULL,
                state TEXT NOT NULL,
                attempts INTEGER DEFAULT 0,
                max_retries INTEGER DEFAULT 3,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                error_message TEXT,
                next_retry_at TEXT,
                completed_at TEXT,
                priority INTEGER DEFAULT 0,
                run_at TEXT,
                timeout_seconds INTEGER,
                last_stdout TEXT,
                last_stderr TEXT,
                duration_ms INTEGER
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS workers (
                id TEXT PRIMARY KEY,
                pid INTEGER,
                name TEXT,
                started_at TEXT NOT NULL,
                last_heartbeat TEXT NOT NULL,
                stopped_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        // Indexes on always-present columns.
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_state ON jobs(state)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_next_retry ON jobs(next_retry_at)")
            .execute(&self.pool)
            .await?;

        // Older files predate some columns; add them before indexing them.
        self.ensure_job_columns().await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_run_at ON jobs(run_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_priority ON jobs(priority)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn ensure_job_columns(&self) -> StoreResult<()> {
        let rows = sqlx::query("PRAGMA table_info(jobs)")
            .fetch_all(&self.pool)
            .await?;
        let existing: HashSet<String> = rows
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        for (name, declaration) in EVOLVED_JOB_COLUMNS {
            if !existing.contains(*name) {
                debug!(column = name, "Adding missing jobs column");
                sqlx::query(&format!("ALTER TABLE jobs ADD COLUMN {name} {declaration}"))
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    // -------------------- Jobs --------------------

    /// Insert a new job; fails with [`StoreError::DuplicateJob`] when the id
    /// is taken, leaving the existing row unchanged.
    pub async fn insert_job(&self, job: &Job) -> StoreResult<()> {
        let result = self.write_job("INSERT INTO jobs", job).await;
        match result {
            Err(StoreError::Database(sqlx::Error::Database(db_err)))
                if db_err.is_unique_violation() =>
            {
                Err(StoreError::DuplicateJob(job.id.clone()))
            }
            other => other,
        }
    }

    /// Overwrite the whole row with the caller-supplied post-execution state.
    pub async fn save_job(&self, job: &Job) -> StoreResult<()> {
        self.write_job("INSERT OR REPLACE INTO jobs", job).await
    }

    async fn write_job(&self, insert_clause: &str, job: &Job) -> StoreResult<()> {
        let sql = format!(
            "{insert_clause} ({JOB_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&sql)
            .bind(&job.id)
            .bind(&job.command)
            .bind(job.state.to_string())
            .bind(job.attempts as i64)
            .bind(job.max_retries as i64)
            .bind(job.created_at)
            .bind(job.updated_at)
            .bind(&job.error_message)
            .bind(job.next_retry_at)
            .bind(job.completed_at)
            .bind(job.priority)
            .bind(job.run_at)
            .bind(job.timeout_seconds.map(|t| t as i64))
            .bind(&job.last_stdout)
            .bind(&job.last_stderr)
            .bind(job.duration_ms.map(|d| d as i64))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Point lookup by id.
    pub async fn job(&self, id: &str) -> StoreResult<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Job::try_from).transpose()
    }

    /// All jobs in `state`, oldest first.
    pub async fn jobs_by_state(&self, state: JobState) -> StoreResult<Vec<Job>> {
        let rows: Vec<JobRow> =
            sqlx::query_as("SELECT * FROM jobs WHERE state = ? ORDER BY created_at")
                .bind(state.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Job::try_from).collect()
    }

    /// All jobs, most recent first.
    pub async fn all_jobs(&self) -> StoreResult<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as("SELECT * FROM jobs ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Job::try_from).collect()
    }

    /// Count of jobs per state, zero-filled for every known state.
    pub async fn job_counts(&self) -> StoreResult<BTreeMap<JobState, u64>> {
        let mut counts: BTreeMap<JobState, u64> = JobState::iter().map(|s| (s, 0)).collect();
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await?;
        for (state, count) in rows {
            if let Ok(state) = state.parse::<JobState>() {
                counts.insert(state, count as u64);
            }
        }
        Ok(counts)
    }

    /// Atomically claim the next eligible pending job.
    ///
    /// The highest-priority (ties: oldest) `pending` row whose `run_at` has
    /// passed is flipped to `processing` in a single conditional update; the
    /// `state = 'pending'` guard is the CAS that prevents double-claim under
    /// contention. SQLite holds the writer lock for the whole statement, so
    /// the candidate read and the conditional update cannot interleave with
    /// another claimer. Returns `None` when no job is eligible.
    pub async fn claim_next(&self) -> StoreResult<Option<Job>> {
        let now = Utc::now();
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "UPDATE jobs SET state = ?1, updated_at = ?2
             WHERE state = ?3 AND id = (
                 SELECT id FROM jobs
                 WHERE state = ?3 AND (run_at IS NULL OR run_at <= ?4)
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(JobState::Processing.to_string())
        .bind(now)
        .bind(JobState::Pending.to_string())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Job::try_from).transpose()
    }

    /// Jobs in `failed` whose retry timer has elapsed, soonest first.
    pub async fn retryable_jobs(&self) -> StoreResult<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT * FROM jobs WHERE state = ? AND next_retry_at <= ? ORDER BY next_retry_at",
        )
        .bind(JobState::Failed.to_string())
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Job::try_from).collect()
    }

    /// Delete a job row. Returns whether a row was removed.
    pub async fn delete_job(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -------------------- Maintenance --------------------

    /// Reset `processing` rows whose `updated_at` is older than `max_age`
    /// back to `pending`, preserving `attempts`. Rows without an error
    /// message are annotated so the recovery is visible on inspection.
    /// Returns the number of rows reset.
    pub async fn reset_stale_processing(&self, max_age: Duration) -> StoreResult<u64> {
        let now = Utc::now();
        let cutoff = now - max_age;
        let result = sqlx::query(
            "UPDATE jobs
             SET state = ?, updated_at = ?,
                 error_message = COALESCE(error_message, 'recovered from stale processing')
             WHERE state = ? AND updated_at <= ?",
        )
        .bind(JobState::Pending.to_string())
        .bind(now)
        .bind(JobState::Processing.to_string())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // -------------------- Metrics --------------------

    /// Integer mean of `duration_ms` over the last 20 completed jobs with a
    /// recorded duration; `None` when no such jobs exist.
    pub async fn avg_duration_ms(&self) -> StoreResult<Option<i64>> {
        let avg: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(duration_ms) FROM (
                 SELECT duration_ms FROM jobs
                 WHERE state = ? AND duration_ms IS NOT NULL
                 ORDER BY completed_at DESC
                 LIMIT 20
             )",
        )
        .bind(JobState::Completed.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(avg.map(|v| v as i64))
    }

    /// Number of jobs completed within the trailing `window`.
    pub async fn completed_within(&self, window: Duration) -> StoreResult<u64> {
        let cutoff = Utc::now() - window;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs
             WHERE state = ? AND completed_at IS NOT NULL AND completed_at >= ?",
        )
        .bind(JobState::Completed.to_string())
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}
