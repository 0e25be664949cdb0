//! Command implementations for the queuectl CLI.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use eyre::{WrapErr, bail};
use tabled::{Table, Tabled, settings::Style};
use tokio::net::TcpListener;
use tracing::{error, info};

use queue_core::{Job, JobState};
use queue_store::Store;
use queue_worker::{HealthState, QueueManager, WorkerPool, health_router, metrics};

async fn open_store(db: &Path) -> eyre::Result<Store> {
    Store::connect(db)
        .await
        .wrap_err_with(|| format!("Failed to open database at {}", db.display()))
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn fmt_opt_ts(ts: Option<DateTime<Utc>>) -> String {
    ts.map(fmt_ts).unwrap_or_default()
}

/// Clip a value for tabular display, appending an ellipsis when shortened.
fn clip(value: &str, max_chars: usize) -> String {
    if value.chars().count() > max_chars {
        let head: String = value.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        value.to_string()
    }
}

#[derive(Tabled)]
struct JobLine {
    #[tabled(rename = "Job ID")]
    id: String,
    #[tabled(rename = "Command")]
    command: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Attempts")]
    attempts: String,
    #[tabled(rename = "Created At")]
    created_at: String,
    #[tabled(rename = "Error")]
    error: String,
}

impl From<&Job> for JobLine {
    fn from(job: &Job) -> Self {
        Self {
            id: clip(&job.id, 20),
            command: clip(&job.command, 30),
            state: job.state.to_string(),
            attempts: format!("{}/{}", job.attempts, job.max_retries),
            created_at: fmt_ts(job.created_at),
            error: clip(job.error_message.as_deref().unwrap_or(""), 40),
        }
    }
}

fn render<T: Tabled>(lines: Vec<T>) -> String {
    Table::new(lines).with(Style::sharp()).to_string()
}

pub async fn enqueue(db: &Path, job_json: &str) -> eyre::Result<()> {
    let manager = QueueManager::new(open_store(db).await?);
    let job = manager.enqueue_json(job_json).await?;

    println!("Job '{}' enqueued successfully", job.id);
    println!("  Command: {}", job.command);
    println!("  Max retries: {}", job.max_retries);
    if let Some(run_at) = job.run_at {
        println!("  Run at: {}", run_at.to_rfc3339());
    }
    if job.priority != 0 {
        println!("  Priority: {}", job.priority);
    }
    if let Some(timeout) = job.timeout_seconds {
        println!("  Timeout: {timeout}s");
    }
    Ok(())
}

pub async fn status(db: &Path) -> eyre::Result<()> {
    let store = open_store(db).await?;
    let counts = store.job_counts().await?;
    let total: u64 = counts.values().sum();

    println!();
    println!("{}", "=".repeat(50));
    println!("QueueCTL Status");
    println!("{}", "=".repeat(50));

    println!("\nJob Statistics:");
    println!("{}", "-".repeat(50));
    println!("{:<24} {}", "Total Jobs", total);
    println!("{:<24} {}", "Pending", counts[&JobState::Pending]);
    println!("{:<24} {}", "Processing", counts[&JobState::Processing]);
    println!("{:<24} {}", "Completed", counts[&JobState::Completed]);
    println!("{:<24} {}", "Failed (Retrying)", counts[&JobState::Failed]);
    println!("{:<24} {}", "Dead (DLQ)", counts[&JobState::Dead]);

    let active = store.active_worker_count(Duration::seconds(10)).await?;
    println!("\nWorkers:");
    println!("{}", "-".repeat(50));
    println!("{:<24} {}", "Active Workers", active);

    let avg = store.avg_duration_ms().await?;
    let last_min = store.completed_within(Duration::seconds(60)).await?;
    println!("\nMetrics:");
    println!("{}", "-".repeat(50));
    let avg_display = avg.map(|ms| format!("{ms} ms")).unwrap_or_else(|| "n/a".to_string());
    println!("{:<28} {}", "Average Duration (last 20)", avg_display);
    println!("{:<28} {}", "Completed Last Minute", last_min);

    if total > 0 {
        println!("\nRecent Jobs:");
        println!("{}", "-".repeat(50));
        let recent: Vec<JobLine> = store
            .all_jobs()
            .await?
            .iter()
            .take(10)
            .map(JobLine::from)
            .collect();
        println!("{}", render(recent));
    }

    println!();
    Ok(())
}

pub async fn list(db: &Path, state: Option<JobState>) -> eyre::Result<()> {
    let store = open_store(db).await?;

    let jobs = match state {
        Some(state) => {
            println!("\nJobs with state: {state}");
            store.jobs_by_state(state).await?
        }
        None => {
            println!("\nAll Jobs");
            store.all_jobs().await?
        }
    };
    println!("{}", "-".repeat(80));

    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    let lines: Vec<JobLine> = jobs.iter().map(JobLine::from).collect();
    println!("{}", render(lines));
    println!("\nTotal: {} job(s)", jobs.len());
    Ok(())
}

pub async fn info(db: &Path, job_id: &str) -> eyre::Result<()> {
    let store = open_store(db).await?;
    let Some(job) = store.job(job_id).await? else {
        bail!("Job '{job_id}' not found");
    };

    println!("\nJob Details:");
    println!("{}", "=".repeat(50));
    println!("ID:              {}", job.id);
    println!("Command:         {}", job.command);
    println!("State:           {}", job.state);
    println!("Attempts:        {}/{}", job.attempts, job.max_retries);
    println!("Priority:        {}", job.priority);
    println!("Created At:      {}", fmt_ts(job.created_at));
    println!("Updated At:      {}", fmt_ts(job.updated_at));
    if let Some(run_at) = job.run_at {
        println!("Run At:          {}", fmt_ts(run_at));
    }
    if let Some(completed_at) = job.completed_at {
        println!("Completed At:    {}", fmt_ts(completed_at));
    }
    if let Some(next_retry_at) = job.next_retry_at {
        println!("Next Retry At:   {}", fmt_ts(next_retry_at));
    }

    if let Some(error_message) = &job.error_message {
        println!("\nError Message:");
        println!("{}", "-".repeat(50));
        println!("{error_message}");
    }

    if job.last_stdout.is_some() || job.last_stderr.is_some() || job.duration_ms.is_some() {
        println!("\nExecution Details:");
        println!("{}", "-".repeat(50));
        if let Some(duration_ms) = job.duration_ms {
            println!("Duration:       {duration_ms} ms");
        }
        if let Some(stdout) = &job.last_stdout
            && !stdout.is_empty()
        {
            println!("\nStdout:");
            println!("{stdout}");
        }
        if let Some(stderr) = &job.last_stderr
            && !stderr.is_empty()
        {
            println!("\nStderr:");
            println!("{stderr}");
        }
    }

    println!();
    Ok(())
}

#[derive(Tabled)]
struct DlqLine {
    #[tabled(rename = "Job ID")]
    id: String,
    #[tabled(rename = "Command")]
    command: String,
    #[tabled(rename = "Attempts")]
    attempts: String,
    #[tabled(rename = "Failed At")]
    failed_at: String,
    #[tabled(rename = "Error")]
    error: String,
}

pub async fn dlq_list(db: &Path) -> eyre::Result<()> {
    let store = open_store(db).await?;
    let jobs = store.jobs_by_state(JobState::Dead).await?;

    println!("\nDead Letter Queue");
    println!("{}", "-".repeat(80));

    if jobs.is_empty() {
        println!("No jobs in DLQ.");
        return Ok(());
    }

    let lines: Vec<DlqLine> = jobs
        .iter()
        .map(|job| DlqLine {
            id: clip(&job.id, 20),
            command: clip(&job.command, 30),
            attempts: format!("{}/{}", job.attempts, job.max_retries),
            failed_at: fmt_ts(job.updated_at),
            error: clip(job.error_message.as_deref().unwrap_or(""), 40),
        })
        .collect();
    println!("{}", render(lines));
    println!("\nTotal: {} job(s) in DLQ", jobs.len());
    Ok(())
}

pub async fn dlq_retry(db: &Path, job_id: &str) -> eyre::Result<()> {
    let manager = QueueManager::new(open_store(db).await?);
    manager.requeue_from_dlq(job_id).await?;
    println!("Job '{job_id}' moved from DLQ to pending queue");
    Ok(())
}

pub async fn worker_start(db: &Path, count: usize, metrics_port: u16) -> eyre::Result<()> {
    metrics::init_metrics();

    // The health/metrics endpoint runs alongside the pool for the lifetime
    // of the process.
    let store = open_store(db).await?;
    let state = HealthState::new(store, env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    let router = health_router(state);
    tokio::spawn(async move {
        let addr = format!("0.0.0.0:{metrics_port}");
        match TcpListener::bind(&addr).await {
            Ok(listener) => {
                info!(port = metrics_port, "Health and metrics server listening");
                if let Err(err) = axum::serve(listener, router).await {
                    error!(error = %err, "Health server failed");
                }
            }
            Err(err) => error!(error = %err, addr, "Failed to bind health server"),
        }
    });

    println!("Starting {count} worker(s)...");
    println!("Press Ctrl+C to stop gracefully");
    println!("{}", "-".repeat(50));

    let mut pool = WorkerPool::new(db);
    pool.run_until_shutdown(count).await?;

    println!("\nWorkers stopped");
    Ok(())
}

#[derive(Tabled)]
struct WorkerLine {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "PID")]
    pid: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Started")]
    started: String,
    #[tabled(rename = "Last Heartbeat")]
    last_heartbeat: String,
    #[tabled(rename = "Stopped")]
    stopped: String,
    #[tabled(rename = "Status")]
    status: String,
}

pub async fn workers_list(db: &Path) -> eyre::Result<()> {
    let store = open_store(db).await?;
    let workers = store.list_workers().await?;

    if workers.is_empty() {
        println!("No workers found.");
        return Ok(());
    }

    let lines: Vec<WorkerLine> = workers
        .iter()
        .map(|worker| WorkerLine {
            id: clip(&worker.id, 20),
            pid: worker.pid,
            name: worker.name.clone(),
            started: fmt_ts(worker.started_at),
            last_heartbeat: fmt_ts(worker.last_heartbeat),
            stopped: fmt_opt_ts(worker.stopped_at),
            status: if worker.stopped_at.is_some() {
                "stopped".to_string()
            } else {
                "active".to_string()
            },
        })
        .collect();
    println!("{}", render(lines));
    Ok(())
}

#[derive(Tabled)]
struct ConfigLine {
    #[tabled(rename = "Key")]
    key: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

pub async fn config_show(db: &Path) -> eyre::Result<()> {
    let store = open_store(db).await?;
    let config = store.config().await?;

    println!("\nCurrent Configuration:");
    println!("{}", "-".repeat(50));
    let lines = vec![
        ConfigLine {
            key: "max-retries",
            value: config.max_retries.to_string(),
        },
        ConfigLine {
            key: "backoff-base",
            value: config.backoff_base.to_string(),
        },
        ConfigLine {
            key: "worker-poll-interval",
            value: format!("{}s", config.worker_poll_interval),
        },
    ];
    println!("{}", render(lines));
    println!();
    Ok(())
}

pub async fn config_set(db: &Path, key: &str, value: &str) -> eyre::Result<()> {
    let store = open_store(db).await?;
    let mut config = store.config().await?;
    config.set_key(key, value)?;
    store.save_config(&config).await?;
    println!("Configuration updated: {key} = {value}");
    Ok(())
}
