//! Error types for cadence-core
//!
//! Each subsystem owns a focused error enum; this module aggregates them
//! for callers that drive several components at once.

use thiserror::Error;

use crate::limits::LimitError;
use crate::retry::RetryQueueError;
use crate::storage::StorageError;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Persistence failure (SQLite, serialization, filesystem)
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Frequency limit failure
    #[error("frequency limit error: {0}")]
    Limit(#[from] LimitError),

    /// Retrying queue failure
    #[error("retry queue error: {0}")]
    Retry(#[from] RetryQueueError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests;
