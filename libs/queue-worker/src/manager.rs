//! The queue manager: policy layer over the store.
//!
//! Owns enqueue validation, subprocess execution with the retry/DLQ
//! transition policy, retry promotion and manual DLQ reanimation. All
//! durable mutation goes through the store; the manager never caches.

use std::collections::BTreeMap;
use std::time::Duration as StdDuration;

use tracing::{error, info, warn};

use queue_core::{EnqueueRequest, Job, JobState};
use queue_store::{Store, StoreError};

use crate::error::{QueueError, QueueResult};
use crate::executor::{ExecOutcome, run_command};
use crate::metrics::{self, JobOutcomeLabel};

/// Manages job queue operations against a single store handle.
#[derive(Clone)]
pub struct QueueManager {
    store: Store,
}

impl QueueManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Parse and enqueue a submission from its JSON wire form. Parse and
    /// validation failures surface as [`QueueError::InvalidRequest`].
    pub async fn enqueue_json(&self, raw: &str) -> QueueResult<Job> {
        let request = EnqueueRequest::from_json(raw)?;
        self.enqueue(request).await
    }

    /// Validate and persist a submission. Rejects duplicate ids; fills an
    /// unset retry budget from the current config snapshot.
    pub async fn enqueue(&self, request: EnqueueRequest) -> QueueResult<Job> {
        let config = self.store.config().await?;
        let job = request.into_job(&config);

        match self.store.insert_job(&job).await {
            Ok(()) => {
                info!(job_id = %job.id, command = %job.command, "Job enqueued");
                Ok(job)
            }
            Err(StoreError::DuplicateJob(id)) => Err(QueueError::DuplicateJob(id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Execute a claimed job and record the outcome. Returns whether the
    /// execution succeeded; every failure path goes through the retry/DLQ
    /// transition.
    pub async fn execute(&self, job: &mut Job) -> QueueResult<bool> {
        let config = self.store.config().await?;
        let timeout_secs = job.timeout_seconds.unwrap_or(config.default_timeout_seconds);

        info!(job_id = %job.id, command = %job.command, timeout_secs, "Executing job");
        let report = run_command(&job.command, StdDuration::from_secs(timeout_secs)).await;

        match report.outcome {
            ExecOutcome::Exited(0) => {
                job.last_stdout = Some(report.stdout);
                job.last_stderr = Some(report.stderr);
                job.duration_ms = Some(report.duration_ms);
                job.mark_completed();
                self.store.save_job(job).await?;
                metrics::record_job_processed(JobOutcomeLabel::Completed);
                info!(job_id = %job.id, duration_ms = report.duration_ms, "Job completed");
                Ok(true)
            }
            ExecOutcome::Exited(code) => {
                let message = if !report.stderr.is_empty() {
                    report.stderr.clone()
                } else if !report.stdout.is_empty() {
                    report.stdout.clone()
                } else {
                    format!("Command exited with code {code}")
                };
                job.last_stdout = Some(report.stdout);
                job.last_stderr = Some(report.stderr);
                job.duration_ms = Some(report.duration_ms);
                error!(job_id = %job.id, code, "Job failed");
                self.handle_failure(job, message, &config).await?;
                Ok(false)
            }
            ExecOutcome::TimedOut(secs) => {
                error!(job_id = %job.id, timeout_secs = secs, "Job timed out");
                self.handle_failure(job, format!("Job execution timed out ({secs}s)"), &config)
                    .await?;
                Ok(false)
            }
            ExecOutcome::SpawnFailed(message) => {
                error!(job_id = %job.id, error = %message, "Job failed to spawn");
                self.handle_failure(job, message, &config).await?;
                Ok(false)
            }
        }
    }

    /// Apply the failure transition: retry with exponential backoff while
    /// the budget lasts, otherwise park the job in the DLQ.
    async fn handle_failure(
        &self,
        job: &mut Job,
        message: String,
        config: &queue_core::QueueConfig,
    ) -> QueueResult<()> {
        job.record_failure(message, config.backoff_base);

        match job.state {
            JobState::Dead => {
                warn!(job_id = %job.id, attempts = job.attempts, "Job exhausted all retries, moving to DLQ");
                metrics::record_job_processed(JobOutcomeLabel::Dead);
            }
            _ => {
                info!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    max_retries = job.max_retries,
                    next_retry_at = ?job.next_retry_at,
                    "Job scheduled for retry"
                );
                metrics::record_job_processed(JobOutcomeLabel::Retried);
            }
        }

        self.store.save_job(job).await?;
        Ok(())
    }

    /// Flip every failed job whose retry timer has elapsed back to pending.
    /// Returns the number promoted.
    pub async fn promote_retries(&self) -> QueueResult<u64> {
        let due = self.store.retryable_jobs().await?;
        let mut count = 0;
        for mut job in due {
            job.promote_for_retry();
            self.store.save_job(&job).await?;
            count += 1;
            info!(job_id = %job.id, "Job promoted to pending for retry");
        }
        Ok(count)
    }

    /// Atomically claim the next eligible job.
    pub async fn claim_next(&self) -> QueueResult<Option<Job>> {
        Ok(self.store.claim_next().await?)
    }

    pub async fn job(&self, id: &str) -> QueueResult<Option<Job>> {
        Ok(self.store.job(id).await?)
    }

    pub async fn jobs_by_state(&self, state: JobState) -> QueueResult<Vec<Job>> {
        Ok(self.store.jobs_by_state(state).await?)
    }

    pub async fn all_jobs(&self) -> QueueResult<Vec<Job>> {
        Ok(self.store.all_jobs().await?)
    }

    pub async fn counts(&self) -> QueueResult<BTreeMap<JobState, u64>> {
        Ok(self.store.job_counts().await?)
    }

    /// Reanimate a DLQ job: back to pending with a fresh attempt budget.
    pub async fn requeue_from_dlq(&self, id: &str) -> QueueResult<Job> {
        let mut job = self
            .store
            .job(id)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;

        if job.state != JobState::Dead {
            return Err(QueueError::NotInDeadLetterQueue {
                id: id.to_string(),
                state: job.state,
            });
        }

        job.requeue_from_dlq();
        self.store.save_job(&job).await?;
        info!(job_id = %job.id, "Job moved from DLQ to pending");
        Ok(job)
    }

    pub async fn delete(&self, id: &str) -> QueueResult<bool> {
        Ok(self.store.delete_job(id).await?)
    }
}
