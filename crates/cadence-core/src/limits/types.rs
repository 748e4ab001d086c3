//! Frequency limit types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::storage::StorageError;

/// Frequency limit errors
#[derive(Debug, Error)]
pub enum LimitError {
    /// A checker was requested for an unknown constraint
    #[error("frequency constraint not found: {0}")]
    ConstraintNotFound(String),

    /// Persistence failure
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for frequency limit operations
pub type LimitResult<T> = std::result::Result<T, LimitError>;

/// At most `count` occurrences per rolling `range`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyConstraint {
    /// Constraint ID
    pub id: String,
    /// Window length
    #[serde(rename = "range_ms", with = "duration_millis")]
    pub range: Duration,
    /// Occurrences allowed within the window
    pub count: u32,
}

impl FrequencyConstraint {
    /// Create a constraint
    pub fn new(id: impl Into<String>, range: Duration, count: u32) -> Self {
        Self {
            id: id.into(),
            range,
            count,
        }
    }
}

/// A recorded occurrence of a constrained action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    /// Constraint the occurrence counts against
    pub constraint_id: String,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl Occurrence {
    /// Create an occurrence
    pub fn new(constraint_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            constraint_id: constraint_id.into(),
            timestamp,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
