use super::{SqliteAutomationStore, StorageError, StorageResult};
use tracing::debug;

const SCHEMA: &[(&str, &str)] = &[
    (
        "trigger_data",
        r#"
        CREATE TABLE IF NOT EXISTS trigger_data (
            schedule_id TEXT NOT NULL,
            trigger_id TEXT NOT NULL,
            count REAL NOT NULL DEFAULT 0,
            last_state_json TEXT,
            updated_at TIMESTAMP NOT NULL,
            PRIMARY KEY (schedule_id, trigger_id)
        )
        "#,
    ),
    (
        "frequency_constraints",
        r#"
        CREATE TABLE IF NOT EXISTS frequency_constraints (
            id TEXT PRIMARY KEY,
            range_ms INTEGER NOT NULL,
            count INTEGER NOT NULL
        )
        "#,
    ),
    (
        "frequency_occurrences",
        r#"
        CREATE TABLE IF NOT EXISTS frequency_occurrences (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            constraint_id TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            FOREIGN KEY (constraint_id) REFERENCES frequency_constraints(id) ON DELETE CASCADE
        )
        "#,
    ),
    (
        "idx_occurrences_constraint",
        "CREATE INDEX IF NOT EXISTS idx_occurrences_constraint ON frequency_occurrences(constraint_id, timestamp)",
    ),
];

impl SqliteAutomationStore {
    /// Run database migrations
    pub(super) async fn migrate(&self) -> StorageResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Transaction(e.to_string()))?;

        for &(name, sql) in SCHEMA {
            sqlx::query(sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Transaction(format!("Migration failed ({}): {}", name, e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Transaction(e.to_string()))?;

        debug!("Automation schema initialized");
        Ok(())
    }
}
