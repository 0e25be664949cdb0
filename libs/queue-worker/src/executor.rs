//! Timeout-bounded subprocess execution.
//!
//! Commands run through the system shell with piped stdio. Output is
//! drained continuously (so the child never blocks on a full pipe) but only
//! the first 4 KiB of each stream is kept; on timeout the child is killed
//! and reaped before the report is returned.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::debug;

use queue_core::{OUTPUT_CAP_BYTES, truncate_output};

/// How a command execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The process exited; `-1` stands in for signal death.
    Exited(i32),
    /// The process exceeded the bound (seconds) and was killed.
    TimedOut(u64),
    /// The process could not be started.
    SpawnFailed(String),
}

/// Outcome plus captured (truncated) output and wall-clock duration.
#[derive(Debug)]
pub struct ExecReport {
    pub outcome: ExecOutcome,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

fn shell_command(command: &str) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
}

fn spawn_error_message(err: &std::io::Error) -> String {
    if err.kind() == std::io::ErrorKind::NotFound {
        "Command not found".to_string()
    } else {
        err.to_string()
    }
}

/// Drain a pipe to EOF, keeping only the first `cap` bytes.
async fn drain_capped(pipe: Option<impl AsyncRead + Unpin>, cap: usize) -> Vec<u8> {
    let Some(mut pipe) = pipe else {
        return Vec::new();
    };
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if kept.len() < cap {
                    let take = (cap - kept.len()).min(n);
                    kept.extend_from_slice(&chunk[..take]);
                }
            }
        }
    }
    kept
}

async fn collect(task: JoinHandle<Vec<u8>>) -> String {
    match task.await {
        Ok(bytes) => truncate_output(&String::from_utf8_lossy(&bytes), OUTPUT_CAP_BYTES),
        Err(_) => String::new(),
    }
}

/// Run `command` through the shell, bounded by `timeout`.
pub async fn run_command(command: &str, timeout: Duration) -> ExecReport {
    let started = Instant::now();

    let mut cmd = shell_command(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            return ExecReport {
                outcome: ExecOutcome::SpawnFailed(spawn_error_message(&err)),
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }
    };

    let stdout_task = tokio::spawn(drain_capped(child.stdout.take(), OUTPUT_CAP_BYTES));
    let stderr_task = tokio::spawn(drain_capped(child.stderr.take(), OUTPUT_CAP_BYTES));

    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => ExecOutcome::Exited(status.code().unwrap_or(-1)),
            Err(err) => ExecOutcome::SpawnFailed(err.to_string()),
        },
        _ = tokio::time::sleep(timeout) => {
            debug!(command, timeout_secs = timeout.as_secs(), "Command timed out, killing");
            let _ = child.start_kill();
            let _ = child.wait().await;
            ExecOutcome::TimedOut(timeout.as_secs())
        }
    };

    // The child is dead on every path above, so the pipes have hit EOF.
    let stdout = collect(stdout_task).await;
    let stderr = collect(stderr_task).await;

    ExecReport {
        outcome,
        stdout,
        stderr,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_captures_stdout() {
        let report = run_command("echo hi", Duration::from_secs(5)).await;
        assert_eq!(report.outcome, ExecOutcome::Exited(0));
        assert!(report.stdout.contains("hi"));
        assert!(report.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_code_reported() {
        let report = run_command("exit 3", Duration::from_secs(5)).await;
        assert_eq!(report.outcome, ExecOutcome::Exited(3));
    }

    #[tokio::test]
    async fn test_stderr_captured() {
        let report = run_command("echo oops 1>&2; exit 1", Duration::from_secs(5)).await;
        assert_eq!(report.outcome, ExecOutcome::Exited(1));
        assert!(report.stderr.contains("oops"));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let started = Instant::now();
        let report = run_command("sleep 5", Duration::from_secs(1)).await;
        assert_eq!(report.outcome, ExecOutcome::TimedOut(1));
        // The child must not run to completion.
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_output_truncated_to_cap() {
        let report = run_command(
            "head -c 10000 /dev/zero | tr '\\0' x",
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(report.outcome, ExecOutcome::Exited(0));
        assert!(report.stdout.len() <= OUTPUT_CAP_BYTES);
        assert!(report.stdout.starts_with("xxx"));
    }

    #[tokio::test]
    async fn test_duration_measured() {
        let report = run_command("sleep 0.2", Duration::from_secs(5)).await;
        assert_eq!(report.outcome, ExecOutcome::Exited(0));
        assert!(report.duration_ms >= 150);
    }
}
