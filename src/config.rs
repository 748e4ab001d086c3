//! Application configuration types

use anyhow::Result;
use cadence_core::{RetryQueueConfig, SqliteAutomationStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetryAppConfig,
    #[serde(default)]
    pub triggers: TriggersConfig,
}

/// SQLite storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file; `~/.cadence/automation.db` when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the database path
    pub fn resolve_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(SqliteAutomationStore::default_path()?),
        }
    }
}

/// Retrying queue configuration (exposed to TOML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAppConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_operations: usize,
    #[serde(default = "default_max_pending")]
    pub max_pending_results: usize,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_max_concurrent() -> usize {
    3
}

fn default_max_pending() -> usize {
    2
}

fn default_initial_backoff() -> u64 {
    15
}

fn default_max_backoff() -> u64 {
    60
}

impl Default for RetryAppConfig {
    fn default() -> Self {
        Self {
            max_concurrent_operations: default_max_concurrent(),
            max_pending_results: default_max_pending(),
            initial_backoff_secs: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl RetryAppConfig {
    /// Validate and convert to the queue configuration
    pub fn to_queue_config(&self) -> cadence_core::Result<RetryQueueConfig> {
        if self.max_concurrent_operations == 0 || self.max_pending_results == 0 {
            return Err(cadence_core::Error::InvalidConfig(
                "retry limits must be at least 1".to_string(),
            ));
        }
        if self.max_backoff_secs < self.initial_backoff_secs {
            return Err(cadence_core::Error::InvalidConfig(format!(
                "max_backoff_secs ({}) below initial_backoff_secs ({})",
                self.max_backoff_secs, self.initial_backoff_secs
            )));
        }

        Ok(RetryQueueConfig::new()
            .with_max_concurrent_operations(self.max_concurrent_operations)
            .with_max_pending_results(self.max_pending_results)
            .with_initial_backoff(Duration::from_secs(self.initial_backoff_secs))
            .with_max_backoff(Duration::from_secs(self.max_backoff_secs)))
    }
}

/// Trigger processing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggersConfig {
    /// Start with event processing paused
    #[serde(default)]
    pub paused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_config_matches_queue_defaults() {
        let config = RetryAppConfig::default().to_queue_config().unwrap();
        assert_eq!(config, RetryQueueConfig::default());
    }

    #[test]
    fn test_rejects_inverted_backoff() {
        let config = RetryAppConfig {
            initial_backoff_secs: 30,
            max_backoff_secs: 10,
            ..RetryAppConfig::default()
        };
        let error = config.to_queue_config().unwrap_err();
        assert!(error.to_string().contains("max_backoff_secs"));
    }

    #[test]
    fn test_explicit_storage_path() {
        let storage = StorageConfig {
            path: Some(PathBuf::from("/tmp/cadence.db")),
        };
        assert_eq!(storage.resolve_path().unwrap(), PathBuf::from("/tmp/cadence.db"));
    }
}
