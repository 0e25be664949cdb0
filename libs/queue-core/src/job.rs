//! The job entity and its state machine.
//!
//! `JobState` is a closed enum; the legal transition relation is encoded in
//! [`JobState::can_transition_to`] and every mutation of a `Job` goes through
//! one of the transition helpers below, which keep the attempt/backoff
//! accounting consistent.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Captured stdout/stderr is truncated to this many bytes before persisting.
pub const OUTPUT_CAP_BYTES: usize = 4096;

/// Job state enumeration.
///
/// Serialized lowercase both in JSON and in the database.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl JobState {
    /// Whether `self -> next` is a legal transition.
    ///
    /// - `pending -> processing` via the atomic claim
    /// - `processing -> completed | failed | dead` on execution outcome
    /// - `processing -> pending` via the stale-claim reaper
    /// - `failed -> pending` via retry promotion
    /// - `dead -> pending` via manual requeue
    /// - `completed` is strictly terminal
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Dead)
                | (Processing, Pending)
                | (Failed, Pending)
                | (Dead, Pending)
        )
    }

    /// Terminal states accept no further automatic transitions.
    /// `dead` can still be requeued manually.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Dead)
    }
}

/// A background job: a shell command with retry accounting and scheduling
/// metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub state: JobState,
    pub attempts: u32,
    pub max_retries: u32,
    /// Higher wins; ties broken by `created_at` ascending.
    pub priority: i64,
    /// Ineligible to claim until `now >= run_at`.
    pub run_at: Option<DateTime<Utc>>,
    /// Per-job execution bound; falls back to the config default.
    pub timeout_seconds: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set only while `failed`.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub last_stdout: Option<String>,
    pub last_stderr: Option<String>,
    pub duration_ms: Option<u64>,
}

impl Job {
    /// Create a pending job with default retry budget and priority.
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            command: command.into(),
            state: JobState::Pending,
            attempts: 0,
            max_retries: 3,
            priority: 0,
            run_at: None,
            timeout_seconds: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            next_retry_at: None,
            error_message: None,
            last_stdout: None,
            last_stderr: None,
            duration_ms: None,
        }
    }

    /// `processing -> completed`: clears the error and stamps `completed_at`.
    pub fn mark_completed(&mut self) {
        debug_assert!(self.state.can_transition_to(JobState::Completed));
        let now = Utc::now();
        self.state = JobState::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
        self.error_message = None;
        self.next_retry_at = None;
    }

    /// `processing -> failed | dead`: increments `attempts` and either
    /// schedules the next retry at `now + backoff_base^attempts` seconds or,
    /// once the budget is spent, parks the job in the DLQ.
    pub fn record_failure(&mut self, error: impl Into<String>, backoff_base: u32) {
        debug_assert!(self.state.can_transition_to(JobState::Failed));
        let now = Utc::now();
        self.attempts += 1;
        self.error_message = Some(error.into());
        self.updated_at = now;

        if self.attempts >= self.max_retries {
            self.state = JobState::Dead;
            self.next_retry_at = None;
        } else {
            let delay = backoff_delay_seconds(backoff_base, self.attempts);
            self.state = JobState::Failed;
            self.next_retry_at = Some(
                now.checked_add_signed(Duration::seconds(delay))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            );
        }
    }

    /// `failed -> pending`: the retry timer elapsed.
    pub fn promote_for_retry(&mut self) {
        debug_assert!(self.state.can_transition_to(JobState::Pending));
        self.state = JobState::Pending;
        self.next_retry_at = None;
        self.updated_at = Utc::now();
    }

    /// `dead -> pending`: manual reanimation. Resets the attempt counter and
    /// clears the failure bookkeeping.
    pub fn requeue_from_dlq(&mut self) {
        debug_assert!(self.state.can_transition_to(JobState::Pending));
        self.state = JobState::Pending;
        self.attempts = 0;
        self.error_message = None;
        self.next_retry_at = None;
        self.updated_at = Utc::now();
    }
}

/// Exponential backoff delay in seconds: `base^attempts`, counted after the
/// attempt increment. Saturates at `i64::MAX` rather than wrapping.
pub fn backoff_delay_seconds(base: u32, attempts: u32) -> i64 {
    (base as i64).checked_pow(attempts).unwrap_or(i64::MAX)
}

/// Truncate captured output to `cap` bytes on a char boundary.
pub fn truncate_output(output: &str, cap: usize) -> String {
    if output.len() <= cap {
        return output.to_string();
    }
    let mut end = cap;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    output[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_state_round_trips_through_strings() {
        for state in JobState::iter() {
            let s = state.to_string();
            assert_eq!(s.parse::<JobState>().unwrap(), state);
        }
        assert_eq!("dead".parse::<JobState>().unwrap(), JobState::Dead);
        assert!("zombie".parse::<JobState>().is_err());
    }

    #[test]
    fn test_legal_transitions() {
        use JobState::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Dead));
        assert!(Processing.can_transition_to(Pending));
        assert!(Failed.can_transition_to(Pending));
        assert!(Dead.can_transition_to(Pending));

        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Dead.is_terminal());
        assert!(!JobState::Failed.is_terminal());
        assert!(!JobState::Pending.is_terminal());
    }

    #[test]
    fn test_mark_completed_clears_error() {
        let mut job = Job::new("j1", "echo hi");
        job.state = JobState::Processing;
        job.error_message = Some("old".to_string());

        job.mark_completed();

        assert_eq!(job.state, JobState::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.error_message.is_none());
        assert!(job.next_retry_at.is_none());
    }

    #[test]
    fn test_record_failure_schedules_retry() {
        let mut job = Job::new("j1", "false");
        job.max_retries = 3;
        job.state = JobState::Processing;

        let before = Utc::now();
        job.record_failure("boom", 2);

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.error_message.as_deref(), Some("boom"));

        // First retry waits backoff_base^1 seconds.
        let next = job.next_retry_at.expect("retry must be scheduled");
        let delta = (next - before).num_seconds();
        assert!((1..=3).contains(&delta), "delta was {delta}");
    }

    #[test]
    fn test_record_failure_moves_to_dlq_when_budget_spent() {
        let mut job = Job::new("j1", "false");
        job.max_retries = 2;
        job.state = JobState::Processing;

        job.record_failure("first", 2);
        assert_eq!(job.state, JobState::Failed);

        job.state = JobState::Processing;
        job.record_failure("second", 2);
        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.attempts, 2);
        assert!(job.next_retry_at.is_none());
        assert!(job.attempts >= job.max_retries);
    }

    #[test]
    fn test_backoff_delay_grows_exponentially() {
        assert_eq!(backoff_delay_seconds(2, 1), 2);
        assert_eq!(backoff_delay_seconds(2, 2), 4);
        assert_eq!(backoff_delay_seconds(2, 3), 8);
        assert_eq!(backoff_delay_seconds(3, 4), 81);
    }

    #[test]
    fn test_backoff_delay_saturates() {
        assert_eq!(backoff_delay_seconds(2, 63), i64::MAX);
        assert_eq!(backoff_delay_seconds(10, 200), i64::MAX);
    }

    #[test]
    fn test_requeue_from_dlq_resets_accounting() {
        let mut job = Job::new("j1", "false");
        job.state = JobState::Dead;
        job.attempts = 3;
        job.error_message = Some("gone".to_string());

        job.requeue_from_dlq();

        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.error_message.is_none());
        assert!(job.next_retry_at.is_none());
    }

    #[test]
    fn test_promote_clears_retry_timer() {
        let mut job = Job::new("j1", "false");
        job.state = JobState::Failed;
        job.next_retry_at = Some(Utc::now());

        job.promote_for_retry();

        assert_eq!(job.state, JobState::Pending);
        assert!(job.next_retry_at.is_none());
    }

    #[test]
    fn test_truncate_output_respects_cap() {
        let long = "x".repeat(10_000);
        assert_eq!(truncate_output(&long, OUTPUT_CAP_BYTES).len(), OUTPUT_CAP_BYTES);

        let short = "hello";
        assert_eq!(truncate_output(short, OUTPUT_CAP_BYTES), "hello");
    }

    #[test]
    fn test_truncate_output_respects_char_boundaries() {
        // Multi-byte chars straddling the cap must not split.
        let s = "é".repeat(3000); // 2 bytes each
        let truncated = truncate_output(&s, 4096);
        assert!(truncated.len() <= 4096);
        assert!(truncated.chars().all(|c| c == 'é'));
    }
}
