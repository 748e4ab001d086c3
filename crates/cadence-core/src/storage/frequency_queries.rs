use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::time::Duration;

use super::{SqliteAutomationStore, StorageError, StorageResult};
use crate::limits::{FrequencyConstraint, FrequencyStore, Occurrence};

#[derive(FromRow)]
struct ConstraintRow {
    id: String,
    range_ms: i64,
    count: i64,
}

impl TryFrom<ConstraintRow> for FrequencyConstraint {
    type Error = StorageError;

    fn try_from(row: ConstraintRow) -> StorageResult<Self> {
        let range_ms = u64::try_from(row.range_ms)
            .map_err(|_| StorageError::InvalidData(format!("negative range for {}", row.id)))?;
        let count = u32::try_from(row.count)
            .map_err(|_| StorageError::InvalidData(format!("invalid count for {}", row.id)))?;

        Ok(FrequencyConstraint {
            id: row.id,
            range: Duration::from_millis(range_ms),
            count,
        })
    }
}

#[derive(FromRow)]
struct OccurrenceRow {
    constraint_id: String,
    timestamp: i64,
}

impl TryFrom<OccurrenceRow> for Occurrence {
    type Error = StorageError;

    fn try_from(row: OccurrenceRow) -> StorageResult<Self> {
        let timestamp = Utc
            .timestamp_millis_opt(row.timestamp)
            .single()
            .ok_or_else(|| StorageError::InvalidData(format!("invalid timestamp {}", row.timestamp)))?;

        Ok(Occurrence {
            constraint_id: row.constraint_id,
            timestamp,
        })
    }
}

fn range_millis(constraint: &FrequencyConstraint) -> i64 {
    i64::try_from(constraint.range.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl FrequencyStore for SqliteAutomationStore {
    async fn get_constraint(&self, id: &str) -> StorageResult<Option<FrequencyConstraint>> {
        let row: Option<ConstraintRow> =
            sqlx::query_as("SELECT id, range_ms, count FROM frequency_constraints WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(FrequencyConstraint::try_from).transpose()
    }

    async fn get_all_constraints(&self) -> StorageResult<Vec<FrequencyConstraint>> {
        let rows: Vec<ConstraintRow> =
            sqlx::query_as("SELECT id, range_ms, count FROM frequency_constraints ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(FrequencyConstraint::try_from).collect()
    }

    async fn upsert_constraint(&self, constraint: &FrequencyConstraint) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO frequency_constraints (id, range_ms, count) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET range_ms = excluded.range_ms, count = excluded.count
            "#,
        )
        .bind(&constraint.id)
        .bind(range_millis(constraint))
        .bind(i64::from(constraint.count))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_constraints(&self, ids: &[String]) -> StorageResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM frequency_constraints WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_occurrences(&self, occurrences: &[Occurrence]) -> StorageResult<()> {
        if occurrences.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for occurrence in occurrences {
            sqlx::query("INSERT INTO frequency_occurrences (constraint_id, timestamp) VALUES (?, ?)")
                .bind(&occurrence.constraint_id)
                .bind(occurrence.timestamp.timestamp_millis())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_occurrences(&self, constraint_id: &str) -> StorageResult<Vec<Occurrence>> {
        let rows: Vec<OccurrenceRow> = sqlx::query_as(
            "SELECT constraint_id, timestamp FROM frequency_occurrences WHERE constraint_id = ? ORDER BY timestamp ASC, id ASC",
        )
        .bind(constraint_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Occurrence::try_from).collect()
    }

    async fn delete_occurrences(&self, constraint_ids: &[String]) -> StorageResult<()> {
        if constraint_ids.is_empty() {
            return Ok(());
        }

        let mut builder =
            QueryBuilder::<Sqlite>::new("DELETE FROM frequency_occurrences WHERE constraint_id IN (");
        let mut separated = builder.separated(", ");
        for id in constraint_ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");
        builder.build().execute(&self.pool).await?;
        Ok(())
    }
}
