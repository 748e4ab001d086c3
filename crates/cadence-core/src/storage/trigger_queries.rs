use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, QueryBuilder, Sqlite};

use super::{SqliteAutomationStore, StorageError, StorageResult};
use crate::triggers::{TriggerData, TriggerStore, TriggerableState};

#[derive(FromRow)]
struct TriggerRow {
    schedule_id: String,
    trigger_id: String,
    count: f64,
    last_state_json: Option<String>,
}

impl TryFrom<TriggerRow> for TriggerData {
    type Error = StorageError;

    fn try_from(row: TriggerRow) -> StorageResult<Self> {
        let last_state = row
            .last_state_json
            .map(|json| serde_json::from_str::<TriggerableState>(&json))
            .transpose()?;

        Ok(TriggerData {
            schedule_id: row.schedule_id,
            trigger_id: row.trigger_id,
            count: row.count,
            last_state,
        })
    }
}

// Pushes `(?, ?, ...)` for an IN clause
fn push_in_list<'a>(builder: &mut QueryBuilder<'a, Sqlite>, ids: &'a [String]) {
    builder.push("(");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id.as_str());
    }
    separated.push_unseparated(")");
}

#[async_trait]
impl TriggerStore for SqliteAutomationStore {
    async fn get_trigger(
        &self,
        schedule_id: &str,
        trigger_id: &str,
    ) -> StorageResult<Option<TriggerData>> {
        let row: Option<TriggerRow> = sqlx::query_as(
            "SELECT schedule_id, trigger_id, count, last_state_json FROM trigger_data WHERE schedule_id = ? AND trigger_id = ?",
        )
        .bind(schedule_id)
        .bind(trigger_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TriggerData::try_from).transpose()
    }

    async fn upsert_triggers(&self, triggers: &[TriggerData]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        for data in triggers {
            let last_state_json = data
                .last_state
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            sqlx::query(
                r#"
                INSERT INTO trigger_data (schedule_id, trigger_id, count, last_state_json, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(schedule_id, trigger_id) DO UPDATE SET
                    count = excluded.count,
                    last_state_json = excluded.last_state_json,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&data.schedule_id)
            .bind(&data.trigger_id)
            .bind(data.count)
            .bind(last_state_json)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_triggers(
        &self,
        schedule_id: &str,
        trigger_ids: &[String],
    ) -> StorageResult<()> {
        if trigger_ids.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM trigger_data WHERE schedule_id = ");
        builder.push_bind(schedule_id);
        builder.push(" AND trigger_id IN ");
        push_in_list(&mut builder, trigger_ids);
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_schedule_triggers(&self, schedule_ids: &[String]) -> StorageResult<()> {
        if schedule_ids.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM trigger_data WHERE schedule_id IN ");
        push_in_list(&mut builder, schedule_ids);
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_triggers_excluding(&self, schedule_ids: &[String]) -> StorageResult<()> {
        if schedule_ids.is_empty() {
            sqlx::query("DELETE FROM trigger_data")
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        let mut builder =
            QueryBuilder::<Sqlite>::new("DELETE FROM trigger_data WHERE schedule_id NOT IN ");
        push_in_list(&mut builder, schedule_ids);
        builder.build().execute(&self.pool).await?;
        Ok(())
    }
}
