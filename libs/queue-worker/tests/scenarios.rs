//! End-to-end scenarios: enqueue through worker execution to terminal
//! states, exercised against real SQLite files and real child processes.

use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, Utc};
use tempfile::TempDir;

use queue_core::{EnqueueRequest, Job, JobState};
use queue_store::Store;
use queue_worker::{QueueManager, WorkerPool};

async fn setup(dir: &TempDir) -> (Store, QueueManager) {
    let store = Store::connect(dir.path().join("queue.db")).await.unwrap();
    let manager = QueueManager::new(store.clone());
    (store, manager)
}

fn request(raw: &str) -> EnqueueRequest {
    EnqueueRequest::from_json(raw).unwrap()
}

async fn wait_until<F>(within: StdDuration, mut condition: F) -> bool
where
    F: AsyncFnMut() -> bool,
{
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(StdDuration::from_millis(50)).await;
    }
    false
}

// S1: a single worker picks up an echo job and completes it with output
// and duration recorded.
#[tokio::test]
async fn scenario_success() {
    let dir = TempDir::new().unwrap();
    let (store, manager) = setup(&dir).await;

    manager
        .enqueue(request(r#"{"id":"a","command":"echo hi"}"#))
        .await
        .unwrap();

    let mut pool = WorkerPool::new(dir.path().join("queue.db"));
    pool.start(1).await.unwrap();

    let done = wait_until(StdDuration::from_secs(3), async || {
        matches!(
            store.job("a").await.unwrap(),
            Some(job) if job.state == JobState::Completed
        )
    })
    .await;
    pool.stop().await;
    assert!(done, "job did not complete within 3s");

    let job = store.job("a").await.unwrap().unwrap();
    assert!(job.last_stdout.as_deref().unwrap().contains("hi"));
    assert!(job.duration_ms.is_some());
}

// S2: a failing job is retried on the backoff schedule, then diverted to
// the DLQ once the budget is spent.
#[tokio::test]
async fn scenario_retry_then_dlq() {
    let dir = TempDir::new().unwrap();
    let (store, manager) = setup(&dir).await;

    manager
        .enqueue(request(r#"{"id":"b","command":"exit 1","max_retries":2}"#))
        .await
        .unwrap();

    let mut pool = WorkerPool::new(dir.path().join("queue.db"));
    pool.start(1).await.unwrap();

    // First failure: attempts = 1, retry scheduled backoff_base^1 = 2s out.
    let failed_once = wait_until(StdDuration::from_secs(3), async || {
        matches!(
            store.job("b").await.unwrap(),
            Some(job) if job.state == JobState::Failed && job.attempts == 1
        )
    })
    .await;
    assert!(failed_once, "first failure not observed");

    let job = store.job("b").await.unwrap().unwrap();
    let next = job.next_retry_at.expect("retry must be scheduled");
    let lead = (next - Utc::now()).num_milliseconds();
    assert!(lead <= 2_500, "retry scheduled too far out: {lead}ms");

    // Second failure after the timer elapses: budget spent, DLQ.
    let dead = wait_until(StdDuration::from_secs(10), async || {
        matches!(
            store.job("b").await.unwrap(),
            Some(job) if job.state == JobState::Dead
        )
    })
    .await;
    pool.stop().await;
    assert!(dead, "job never reached the DLQ");

    let job = store.job("b").await.unwrap().unwrap();
    assert_eq!(job.attempts, 2);
    assert!(job.next_retry_at.is_none());
}

// S3: claims follow priority desc then age, and a future run_at makes a
// job ineligible.
#[tokio::test]
async fn scenario_priority_and_run_at() {
    let dir = TempDir::new().unwrap();
    let (_store, manager) = setup(&dir).await;

    manager
        .enqueue(request(r#"{"id":"lo","command":"true","priority":1}"#))
        .await
        .unwrap();
    manager
        .enqueue(request(r#"{"id":"hi","command":"true","priority":5}"#))
        .await
        .unwrap();
    let future = (Utc::now() + Duration::hours(1)).to_rfc3339();
    manager
        .enqueue(request(&format!(
            r#"{{"id":"future","command":"true","priority":10,"run_at":"{future}"}}"#
        )))
        .await
        .unwrap();

    assert_eq!(manager.claim_next().await.unwrap().unwrap().id, "hi");
    assert_eq!(manager.claim_next().await.unwrap().unwrap().id, "lo");
    assert!(manager.claim_next().await.unwrap().is_none());
}

// S4: a job exceeding its timeout fails with a "timed out" message and the
// child is killed rather than run to completion.
#[tokio::test]
async fn scenario_timeout() {
    let dir = TempDir::new().unwrap();
    let (store, manager) = setup(&dir).await;

    manager
        .enqueue(request(
            r#"{"id":"t","command":"sleep 5","timeout_seconds":1,"max_retries":1}"#,
        ))
        .await
        .unwrap();

    let started = Instant::now();
    let mut job = manager.claim_next().await.unwrap().unwrap();
    assert!(!manager.execute(&mut job).await.unwrap());
    assert!(started.elapsed() < StdDuration::from_secs(4));

    let job = store.job("t").await.unwrap().unwrap();
    assert!(matches!(job.state, JobState::Failed | JobState::Dead));
    assert!(job.error_message.as_deref().unwrap().contains("timed out"));
}

// S5: reanimating a DLQ job resets its accounting and returns it to
// pending.
#[tokio::test]
async fn scenario_reanimation() {
    let dir = TempDir::new().unwrap();
    let (store, manager) = setup(&dir).await;

    let mut dead = Job::new("z", "false");
    dead.state = JobState::Dead;
    dead.attempts = 3;
    dead.error_message = Some("exhausted".to_string());
    store.save_job(&dead).await.unwrap();

    manager.requeue_from_dlq("z").await.unwrap();

    let job = store.job("z").await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 0);
    assert!(job.error_message.is_none());
    assert!(job.next_retry_at.is_none());
}

// S6: the reaper resets an abandoned processing row.
#[tokio::test]
async fn scenario_reaper() {
    let dir = TempDir::new().unwrap();
    let (store, _manager) = setup(&dir).await;

    let mut abandoned = Job::new("r", "true");
    abandoned.state = JobState::Processing;
    abandoned.updated_at = Utc::now() - Duration::seconds(1000);
    store.save_job(&abandoned).await.unwrap();

    let reset = store.reset_stale_processing(Duration::seconds(300)).await.unwrap();
    assert_eq!(reset, 1);
    assert_eq!(store.job("r").await.unwrap().unwrap().state, JobState::Pending);
}

// S7: five workers drain fifty no-op jobs without ever double-claiming;
// no job accumulates attempts absent a genuine failure.
#[tokio::test]
async fn scenario_concurrent_drain() {
    let dir = TempDir::new().unwrap();
    let (store, manager) = setup(&dir).await;

    for i in 0..50 {
        manager
            .enqueue(request(&format!(r#"{{"id":"job-{i}","command":"true"}}"#)))
            .await
            .unwrap();
    }

    let mut pool = WorkerPool::new(dir.path().join("queue.db"));
    pool.start(5).await.unwrap();

    let drained = wait_until(StdDuration::from_secs(10), async || {
        store.job_counts().await.unwrap()[&JobState::Completed] == 50
    })
    .await;
    pool.stop().await;
    assert!(drained, "50 jobs not drained within 10s");

    for job in store.all_jobs().await.unwrap() {
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts, 0, "job {} was retried without failing", job.id);
    }
}
