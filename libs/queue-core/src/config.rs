//! Queue configuration.
//!
//! A single record persisted one row per field in the `config` side-table.
//! Readers take the current snapshot; writers overwrite.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown config key '{0}'")]
    UnknownKey(String),

    #[error("invalid value for '{key}': {details}")]
    InvalidValue { key: String, details: String },
}

/// Runtime configuration for the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Retry budget applied to jobs that were enqueued without one.
    pub max_retries: u32,

    /// Base `b` of the exponential backoff `b^attempts` seconds.
    pub backoff_base: u32,

    /// Seconds a worker sleeps when no job was available.
    pub worker_poll_interval: f64,

    /// Execution timeout for jobs without a per-job `timeout_seconds`.
    pub default_timeout_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2,
            worker_poll_interval: 1.0,
            default_timeout_seconds: 300,
        }
    }
}

impl QueueConfig {
    /// Age after which a `processing` claim is considered abandoned and
    /// eligible for the reaper: `max(worker_poll_interval * 120, 300)` seconds.
    ///
    /// Must stay strictly larger than the longest legitimate execution;
    /// operators with long-running jobs should raise `worker-poll-interval`.
    pub fn stale_after(&self) -> Duration {
        Duration::seconds(((self.worker_poll_interval as i64) * 120).max(300))
    }

    /// Apply a CLI-style `config set` assignment.
    ///
    /// Recognized keys: `max-retries` (int), `backoff-base` (int),
    /// `worker-poll-interval` (float).
    pub fn set_key(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |details: String| ConfigError::InvalidValue {
            key: key.to_string(),
            details,
        };
        match key {
            "max-retries" => {
                self.max_retries = value.parse().map_err(|e| invalid(format!("{e}")))?;
            }
            "backoff-base" => {
                self.backoff_base = value.parse().map_err(|e| invalid(format!("{e}")))?;
            }
            "worker-poll-interval" => {
                self.worker_poll_interval = value.parse().map_err(|e| invalid(format!("{e}")))?;
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_base, 2);
        assert_eq!(config.worker_poll_interval, 1.0);
        assert_eq!(config.default_timeout_seconds, 300);
    }

    #[test]
    fn test_stale_after_floor() {
        // Default poll interval: 1s * 120 = 120 < 300, so the floor applies.
        let config = QueueConfig::default();
        assert_eq!(config.stale_after(), Duration::seconds(300));
    }

    #[test]
    fn test_stale_after_scales_with_poll_interval() {
        let config = QueueConfig {
            worker_poll_interval: 5.0,
            ..Default::default()
        };
        assert_eq!(config.stale_after(), Duration::seconds(600));
    }

    #[test]
    fn test_set_key_known_keys() {
        let mut config = QueueConfig::default();
        config.set_key("max-retries", "5").unwrap();
        config.set_key("backoff-base", "3").unwrap();
        config.set_key("worker-poll-interval", "0.5").unwrap();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.backoff_base, 3);
        assert_eq!(config.worker_poll_interval, 0.5);
    }

    #[test]
    fn test_set_key_unknown_key() {
        let mut config = QueueConfig::default();
        let err = config.set_key("jitter", "1").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(_)));
    }

    #[test]
    fn test_set_key_invalid_value() {
        let mut config = QueueConfig::default();
        let err = config.set_key("max-retries", "lots").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        // A failed set leaves the config untouched.
        assert_eq!(config.max_retries, 3);
    }
}
