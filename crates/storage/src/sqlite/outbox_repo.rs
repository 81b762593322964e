use async_trait::async_trait;
use vocab_core::model::ProgressKey;

use crate::repository::{OutboxRepository, PendingWrite, StorageError};

use super::SqliteRepository;
use super::mapping::{conn, key_columns, pending_from_row, ser};

#[async_trait]
impl OutboxRepository for SqliteRepository {
    async fn upsert_pending(&self, write: &PendingWrite) -> Result<(), StorageError> {
        let (kind, entity_id) = key_columns(write.key())?;
        let payload = serde_json::to_string(&write.entry).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO pending_writes (kind, entity_id, payload, queued_at, attempts, last_error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(kind, entity_id) DO UPDATE SET
                payload = excluded.payload,
                queued_at = excluded.queued_at,
                attempts = excluded.attempts,
                last_error = excluded.last_error
            ",
        )
        .bind(kind)
        .bind(entity_id)
        .bind(payload)
        .bind(write.queued_at)
        .bind(i64::from(write.attempts))
        .bind(write.last_error.as_deref())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_pending(&self, key: ProgressKey) -> Result<Option<PendingWrite>, StorageError> {
        let (kind, entity_id) = key_columns(key)?;
        let row = sqlx::query(
            r"
            SELECT kind, entity_id, payload, queued_at, attempts, last_error
            FROM pending_writes
            WHERE kind = ?1 AND entity_id = ?2
            ",
        )
        .bind(kind)
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(pending_from_row).transpose()
    }

    async fn list_pending(&self) -> Result<Vec<PendingWrite>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT kind, entity_id, payload, queued_at, attempts, last_error
            FROM pending_writes
            ORDER BY queued_at ASC, kind ASC, entity_id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(pending_from_row).collect()
    }

    async fn remove_pending(&self, key: ProgressKey) -> Result<(), StorageError> {
        let (kind, entity_id) = key_columns(key)?;
        sqlx::query("DELETE FROM pending_writes WHERE kind = ?1 AND entity_id = ?2")
            .bind(kind)
            .bind(entity_id)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    async fn record_failure(&self, key: ProgressKey, error: &str) -> Result<(), StorageError> {
        let (kind, entity_id) = key_columns(key)?;
        let res = sqlx::query(
            r"
            UPDATE pending_writes
            SET attempts = attempts + 1,
                last_error = ?3
            WHERE kind = ?1 AND entity_id = ?2
            ",
        )
        .bind(kind)
        .bind(entity_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
