//! Metrics for queue observability.
//!
//! Prometheus-compatible metrics exposed through the `/metrics` endpoint:
//!
//! - `queue_jobs_total{state}` - Gauge of jobs per state
//! - `queue_active_workers` - Gauge of workers with a fresh heartbeat
//! - `queue_avg_duration_ms` - Gauge, mean duration of the last 20 completed jobs (0 when none)
//! - `queue_completed_last_min` - Counter, jobs completed in the trailing minute
//! - `queue_jobs_processed_total{outcome}` - Counter of execution outcomes

use std::sync::OnceLock;

use chrono::Duration;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use strum::IntoEnumIterator;

use queue_core::JobState;
use queue_store::{Store, StoreError};

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency
pub mod names {
    pub const JOBS_TOTAL: &str = "queue_jobs_total";
    pub const ACTIVE_WORKERS: &str = "queue_active_workers";
    pub const AVG_DURATION_MS: &str = "queue_avg_duration_ms";
    pub const COMPLETED_LAST_MIN: &str = "queue_completed_last_min";
    pub const JOBS_PROCESSED: &str = "queue_jobs_processed_total";
}

/// Execution outcome for metrics labeling
#[derive(Debug, Clone, Copy)]
pub enum JobOutcomeLabel {
    Completed,
    Retried,
    Dead,
}

impl JobOutcomeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Retried => "retried",
            Self::Dead => "dead",
        }
    }
}

/// Install the Prometheus recorder once at startup and return its handle.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("Failed to install Prometheus recorder")
        })
        .clone()
}

/// The installed handle, if [`init_metrics`] has run.
pub fn handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

/// Record one execution outcome.
pub fn record_job_processed(outcome: JobOutcomeLabel) {
    counter!(
        names::JOBS_PROCESSED,
        "outcome" => outcome.as_str().to_string()
    )
    .increment(1);
}

/// Refresh the store-derived series. Called per scrape so the rendered
/// exposition reflects current durable state.
pub async fn refresh_queue_metrics(store: &Store) -> Result<(), StoreError> {
    let counts = store.job_counts().await?;
    for state in JobState::iter() {
        let count = counts.get(&state).copied().unwrap_or(0);
        gauge!(names::JOBS_TOTAL, "state" => state.to_string()).set(count as f64);
    }

    let active = store.active_worker_count(Duration::seconds(10)).await?;
    gauge!(names::ACTIVE_WORKERS).set(active as f64);

    let avg = store.avg_duration_ms().await?.unwrap_or(0);
    gauge!(names::AVG_DURATION_MS).set(avg as f64);

    let completed = store.completed_within(Duration::seconds(60)).await?;
    counter!(names::COMPLETED_LAST_MIN).absolute(completed);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(JobOutcomeLabel::Completed.as_str(), "completed");
        assert_eq!(JobOutcomeLabel::Retried.as_str(), "retried");
        assert_eq!(JobOutcomeLabel::Dead.as_str(), "dead");
    }

    #[test]
    fn test_init_metrics_is_idempotent() {
        let first = init_metrics();
        let _second = init_metrics();
        assert!(handle().is_some());
        // Rendering never panics even before any series is recorded.
        let _ = first.render();
    }
}
