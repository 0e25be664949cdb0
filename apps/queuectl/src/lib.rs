//! QueueCTL - a CLI-based background job queue system.
//!
//! Manage background jobs with worker pools, automatic retries with
//! exponential backoff, and a Dead Letter Queue for jobs that exhaust
//! their retry budget. State lives in a single SQLite file selected with
//! the global `--db` option.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use queue_core::JobState;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "queuectl", version)]
#[command(about = "A CLI-based background job queue system")]
pub struct Cli {
    /// Database path
    #[arg(long, global = true, default_value = "queuectl.db")]
    pub db: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enqueue a new job from a JSON descriptor
    ///
    /// Example: queuectl enqueue '{"id":"job1","command":"echo Hello"}'
    Enqueue {
        /// JSON object with required "id" and "command" fields
        job_json: String,
    },

    /// Show a summary of job states, workers and metrics
    Status,

    /// List jobs, optionally filtered by state
    List {
        /// Filter by job state (pending, processing, completed, failed, dead)
        #[arg(long)]
        state: Option<JobState>,
    },

    /// Show detailed information about a specific job
    Info {
        /// Job id
        job_id: String,
    },

    /// Manage the Dead Letter Queue (DLQ)
    #[command(subcommand)]
    Dlq(DlqCommands),

    /// Manage worker processes
    #[command(subcommand)]
    Worker(WorkerCommands),

    /// Inspect the worker registry
    #[command(subcommand)]
    Workers(WorkersCommands),

    /// Manage configuration settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum DlqCommands {
    /// List all jobs in the Dead Letter Queue
    List,
    /// Retry a job from the Dead Letter Queue
    Retry {
        /// Job id
        job_id: String,
    },
}

#[derive(Subcommand)]
pub enum WorkerCommands {
    /// Start worker processes; blocks until Ctrl+C / SIGTERM
    Start {
        /// Number of workers to start
        #[arg(long, default_value_t = 1)]
        count: usize,

        /// Port for the health and Prometheus metrics endpoint
        #[arg(long, default_value_t = 8082)]
        metrics_port: u16,
    },
}

#[derive(Subcommand)]
pub enum WorkersCommands {
    /// List registered workers and their heartbeat status
    List,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    ///
    /// Keys: max-retries (int), backoff-base (int),
    /// worker-poll-interval (float)
    Set { key: String, value: String },
}

/// Parse the command line and dispatch. Any error surfaces through eyre
/// and exits with code 1.
pub async fn run() -> eyre::Result<()> {
    logging::install_color_eyre();

    let cli = Cli::parse();

    // Worker processes log their activity; one-shot commands stay quiet so
    // tables render clean.
    let default_filter = match &cli.command {
        Commands::Worker(WorkerCommands::Start { .. }) => "info",
        _ => "warn",
    };
    logging::init_tracing(&logging::Environment::from_env(), default_filter);

    let db = cli.db;
    match cli.command {
        Commands::Enqueue { job_json } => commands::enqueue(&db, &job_json).await,
        Commands::Status => commands::status(&db).await,
        Commands::List { state } => commands::list(&db, state).await,
        Commands::Info { job_id } => commands::info(&db, &job_id).await,
        Commands::Dlq(DlqCommands::List) => commands::dlq_list(&db).await,
        Commands::Dlq(DlqCommands::Retry { job_id }) => commands::dlq_retry(&db, &job_id).await,
        Commands::Worker(WorkerCommands::Start {
            count,
            metrics_port,
        }) => commands::worker_start(&db, count, metrics_port).await,
        Commands::Workers(WorkersCommands::List) => commands::workers_list(&db).await,
        Commands::Config(ConfigCommands::Show) => commands::config_show(&db).await,
        Commands::Config(ConfigCommands::Set { key, value }) => {
            commands::config_set(&db, &key, &value).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_enqueue() {
        let cli = Cli::parse_from(["queuectl", "enqueue", r#"{"id":"a","command":"true"}"#]);
        assert!(matches!(cli.command, Commands::Enqueue { .. }));
        assert_eq!(cli.db, PathBuf::from("queuectl.db"));
    }

    #[test]
    fn test_parse_global_db_option() {
        let cli = Cli::parse_from(["queuectl", "--db", "other.db", "status"]);
        assert_eq!(cli.db, PathBuf::from("other.db"));

        // The global flag is accepted after the subcommand too.
        let cli = Cli::parse_from(["queuectl", "status", "--db", "late.db"]);
        assert_eq!(cli.db, PathBuf::from("late.db"));
    }

    #[test]
    fn test_parse_list_state_filter() {
        let cli = Cli::parse_from(["queuectl", "list", "--state", "dead"]);
        match cli.command {
            Commands::List { state } => assert_eq!(state, Some(JobState::Dead)),
            _ => panic!("expected list command"),
        }

        assert!(Cli::try_parse_from(["queuectl", "list", "--state", "zombie"]).is_err());
    }

    #[test]
    fn test_parse_worker_start_defaults() {
        let cli = Cli::parse_from(["queuectl", "worker", "start"]);
        match cli.command {
            Commands::Worker(WorkerCommands::Start {
                count,
                metrics_port,
            }) => {
                assert_eq!(count, 1);
                assert_eq!(metrics_port, 8082);
            }
            _ => panic!("expected worker start"),
        }
    }
}
