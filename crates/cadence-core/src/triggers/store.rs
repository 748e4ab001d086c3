//! Trigger progress persistence

use async_trait::async_trait;

use super::types::TriggerData;
use crate::storage::StorageResult;

/// Durable key-value storage for trigger progress, keyed by
/// `(schedule_id, trigger_id)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Load progress for one trigger
    async fn get_trigger(
        &self,
        schedule_id: &str,
        trigger_id: &str,
    ) -> StorageResult<Option<TriggerData>>;

    /// Insert or replace progress records
    async fn upsert_triggers(&self, triggers: &[TriggerData]) -> StorageResult<()>;

    /// Delete specific triggers of a schedule
    async fn delete_triggers(&self, schedule_id: &str, trigger_ids: &[String])
        -> StorageResult<()>;

    /// Delete every trigger of the given schedules
    async fn delete_schedule_triggers(&self, schedule_ids: &[String]) -> StorageResult<()>;

    /// Delete every trigger whose schedule is not in `schedule_ids`
    async fn delete_triggers_excluding(&self, schedule_ids: &[String]) -> StorageResult<()>;
}
