//! SQLite persistence
//!
//! A single database backs both [`TriggerStore`](crate::triggers::TriggerStore)
//! and [`FrequencyStore`](crate::limits::FrequencyStore).
//!
//! # Usage
//!
//! ```no_run
//! use cadence_core::storage::SqliteAutomationStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Default location: ~/.cadence/automation.db
//! let store = SqliteAutomationStore::new_default().await?;
//!
//! // Or specify a custom path
//! let store = SqliteAutomationStore::new("/path/to/automation.db").await?;
//! # Ok(())
//! # }
//! ```

mod frequency_queries;
mod migrations;
mod trigger_queries;

#[cfg(test)]
mod tests;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Transaction or migration failure
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Stored data could not be interpreted
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// SQLite store for trigger progress and frequency constraints
#[derive(Clone)]
pub struct SqliteAutomationStore {
    pool: SqlitePool,
}

impl SqliteAutomationStore {
    /// Open (or create) the database at `path`
    ///
    /// # Errors
    ///
    /// Returns error if the directory, connection or migration fails.
    pub async fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        info!(path = %path.display(), "Automation store initialized");
        Ok(store)
    }

    /// Open a private in-memory database
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // every pooled connection would see its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open the database at the default location (~/.cadence/automation.db)
    pub async fn new_default() -> StorageResult<Self> {
        let path = Self::default_path()?;
        Self::new(&path).await
    }

    /// Default database path
    pub fn default_path() -> StorageResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| StorageError::InvalidData("could not determine home directory".to_string()))?;
        Ok(home.join(".cadence").join("automation.db"))
    }
}
