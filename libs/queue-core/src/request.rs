//! The enqueue submission surface.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::config::QueueConfig;
use crate::job::Job;

/// Submission error type
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),
}

/// A job submission as received from a client.
///
/// Required: `id`, `command`. Optional: `max_retries` (filled from the
/// current config snapshot when unset), `priority` (default 0), `run_at`
/// (ISO-8601), `timeout_seconds`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueRequest {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl EnqueueRequest {
    /// Parse a submission from its JSON wire form.
    pub fn from_json(raw: &str) -> Result<Self, RequestError> {
        let request: Self = serde_json::from_str(raw)?;
        if request.id.is_empty() {
            return Err(RequestError::EmptyField("id"));
        }
        if request.command.is_empty() {
            return Err(RequestError::EmptyField("command"));
        }
        Ok(request)
    }

    /// Build the pending job, filling an unset retry budget from `config`.
    pub fn into_job(self, config: &QueueConfig) -> Job {
        let mut job = Job::new(self.id, self.command);
        job.max_retries = self.max_retries.unwrap_or(config.max_retries);
        job.priority = self.priority;
        job.run_at = self.run_at;
        job.timeout_seconds = self.timeout_seconds;
        job
    }
}
