//! Frequency constraint persistence

use async_trait::async_trait;

use super::types::{FrequencyConstraint, Occurrence};
use crate::storage::StorageResult;

/// Durable storage for constraint definitions and occurrence history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrequencyStore: Send + Sync {
    /// Load one constraint
    async fn get_constraint(&self, id: &str) -> StorageResult<Option<FrequencyConstraint>>;

    /// Load every constraint
    async fn get_all_constraints(&self) -> StorageResult<Vec<FrequencyConstraint>>;

    /// Insert or replace a constraint definition, keeping its history
    async fn upsert_constraint(&self, constraint: &FrequencyConstraint) -> StorageResult<()>;

    /// Delete constraints together with their occurrence history
    async fn delete_constraints(&self, ids: &[String]) -> StorageResult<()>;

    /// Append occurrences
    async fn insert_occurrences(&self, occurrences: &[Occurrence]) -> StorageResult<()>;

    /// Occurrence history of a constraint, oldest first
    async fn get_occurrences(&self, constraint_id: &str) -> StorageResult<Vec<Occurrence>>;

    /// Delete the occurrence history of constraints
    async fn delete_occurrences(&self, constraint_ids: &[String]) -> StorageResult<()>;
}
