//! Config side-table operations.
//!
//! The configuration record is stored one row per field, values
//! JSON-encoded. First read on an empty table persists the defaults.

use queue_core::QueueConfig;

use crate::error::StoreResult;
use crate::store::Store;

impl Store {
    /// Current configuration snapshot; defaults are written on first read.
    pub async fn config(&self) -> StoreResult<QueueConfig> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM config")
            .fetch_all(self.pool())
            .await?;

        if rows.is_empty() {
            let config = QueueConfig::default();
            self.save_config(&config).await?;
            return Ok(config);
        }

        let mut config = QueueConfig::default();
        for (key, value) in rows {
            match key.as_str() {
                "max_retries" => config.max_retries = serde_json::from_str(&value)?,
                "backoff_base" => config.backoff_base = serde_json::from_str(&value)?,
                "worker_poll_interval" => {
                    config.worker_poll_interval = serde_json::from_str(&value)?
                }
                "default_timeout_seconds" => {
                    config.default_timeout_seconds = serde_json::from_str(&value)?
                }
                // Keys written by newer versions are ignored.
                _ => {}
            }
        }
        Ok(config)
    }

    /// Overwrite the configuration, one row per field, in one transaction.
    pub async fn save_config(&self, config: &QueueConfig) -> StoreResult<()> {
        let fields = [
            ("max_retries", serde_json::to_string(&config.max_retries)?),
            ("backoff_base", serde_json::to_string(&config.backoff_base)?),
            (
                "worker_poll_interval",
                serde_json::to_string(&config.worker_poll_interval)?,
            ),
            (
                "default_timeout_seconds",
                serde_json::to_string(&config.default_timeout_seconds)?,
            ),
        ];

        let mut tx = self.pool().begin().await?;
        for (key, value) in fields {
            sqlx::query("INSERT OR REPLACE INTO config (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
