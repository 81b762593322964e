use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use vocab_core::model::{ProgressEntry, ProgressKey, ProgressKind};

use crate::repository::{PendingWrite, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Split a key into its `(kind, entity_id)` columns.
pub(crate) fn key_columns(key: ProgressKey) -> Result<(&'static str, i64), StorageError> {
    let id = i64::try_from(key.raw_id())
        .map_err(|_| StorageError::Serialization("entity_id overflow".into()))?;
    Ok((key.kind().as_str(), id))
}

pub(crate) fn key_from_columns(kind: &str, id: i64) -> Result<ProgressKey, StorageError> {
    let kind = ProgressKind::parse(kind)
        .ok_or_else(|| StorageError::Serialization(format!("unknown progress kind: {kind}")))?;
    let id = u64::try_from(id)
        .map_err(|_| StorageError::Serialization("entity_id sign overflow".into()))?;
    Ok(ProgressKey::from_parts(kind, id))
}

pub(crate) fn pending_from_row(row: &SqliteRow) -> Result<PendingWrite, StorageError> {
    let kind: String = row.try_get("kind").map_err(ser)?;
    let entity_id: i64 = row.try_get("entity_id").map_err(ser)?;
    let key = key_from_columns(&kind, entity_id)?;

    let payload: String = row.try_get("payload").map_err(ser)?;
    let entry: ProgressEntry = serde_json::from_str(&payload).map_err(ser)?;
    if entry.key() != key {
        return Err(StorageError::Serialization(format!(
            "payload for {key} describes {}",
            entry.key()
        )));
    }

    let attempts: i64 = row.try_get("attempts").map_err(ser)?;
    Ok(PendingWrite {
        entry,
        queued_at: row.try_get("queued_at").map_err(ser)?,
        attempts: u32::try_from(attempts)
            .map_err(|_| StorageError::Serialization(format!("invalid attempts: {attempts}")))?,
        last_error: row.try_get("last_error").map_err(ser)?,
    })
}
