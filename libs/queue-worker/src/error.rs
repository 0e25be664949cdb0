//! Error types for queue operations.

use queue_core::{JobState, RequestError};
use queue_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the queue manager and worker runtime.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Submission failed parsing or validation before reaching the store.
    #[error("invalid job submission: {0}")]
    InvalidRequest(#[from] RequestError),

    /// Submission rejected: the id is already taken.
    #[error("job with id '{0}' already exists")]
    DuplicateJob(String),

    /// The referenced job does not exist.
    #[error("job '{0}' not found")]
    JobNotFound(String),

    /// DLQ reanimation requested for a job that is not dead.
    #[error("job '{id}' is not in the dead letter queue (state: {state})")]
    NotInDeadLetterQueue { id: String, state: JobState },

    /// Persistence-layer failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
