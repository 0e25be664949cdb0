//! Error types for store operations.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert rejected because the job id is already taken.
    #[error("job with id '{0}' already exists")]
    DuplicateJob(String),

    /// A row carried a state string outside the known set.
    #[error("unknown job state '{0}' in database")]
    InvalidState(String),

    /// SQLite driver error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Config side-table value failed to (de)serialize.
    #[error("config serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
