//! Sync log persistence
//!
//! SQLite storage for the per-user operation log. Log positions (`seq`) are
//! assigned by SQLite and only ever grow.
//!
//! The log keeps the latest operation per record: appending an operation
//! removes the older entries for the same record.

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::{from_db_time, now, to_db_time};
use crate::error::{AppError, Result};

use super::types::{EntityType, OperationType, SyncOperation};

/// Largest batch returned by a single pull
pub const PULL_BATCH_SIZE: u32 = 100;

/// Device id recorded for writes made through the REST API
pub const SERVER_DEVICE_ID: &str = "server";

/// An operation describing a write the server made itself
pub fn server_operation(
    operation_type: OperationType,
    entity_type: EntityType,
    entity_id: &str,
    payload: Option<serde_json::Value>,
) -> SyncOperation {
    SyncOperation {
        id: Uuid::new_v4().to_string(),
        seq: None,
        operation_type,
        entity_type,
        entity_id: entity_id.to_string(),
        payload,
        device_id: SERVER_DEVICE_ID.to_string(),
        timestamp: now(),
    }
}

/// Append `op` to `user_id`'s log on an open connection or transaction.
///
/// Re-appending an operation that is still logged returns its original
/// position.
pub async fn append_operation(
    conn: &mut SqliteConnection,
    user_id: &str,
    op: &SyncOperation,
) -> Result<i64> {
    let payload = op
        .payload
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO sync_operations (
            id, user_id, device_id, operation_type, entity_type,
            entity_id, payload, timestamp
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(&op.id)
    .bind(user_id)
    .bind(&op.device_id)
    .bind(op.operation_type.as_str())
    .bind(op.entity_type.as_str())
    .bind(&op.entity_id)
    .bind(&payload)
    .bind(to_db_time(op.timestamp))
    .execute(&mut *conn)
    .await?;

    let row: (i64,) = sqlx::query_as("SELECT seq FROM sync_operations WHERE id = ?")
        .bind(&op.id)
        .fetch_one(&mut *conn)
        .await?;

    // Superseded entries for the same record
    sqlx::query(
        r#"
        DELETE FROM sync_operations
        WHERE user_id = ? AND entity_type = ? AND entity_id = ? AND seq < ?
        "#,
    )
    .bind(user_id)
    .bind(op.entity_type.as_str())
    .bind(&op.entity_id)
    .bind(row.0)
    .execute(&mut *conn)
    .await?;

    Ok(row.0)
}

/// Repository for the sync operation log
pub struct SyncRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SyncRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an operation and return its log position
    pub async fn record_operation(&self, user_id: &str, op: &SyncOperation) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        append_operation(&mut conn, user_id, op).await
    }

    /// Log a write made through the REST API so devices pull it
    pub async fn record_server_change(
        &self,
        user_id: &str,
        operation_type: OperationType,
        entity_type: EntityType,
        entity_id: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<i64> {
        let op = server_operation(operation_type, entity_type, entity_id, payload);
        self.record_operation(user_id, &op).await
    }

    /// Operations after `since` made by other devices, oldest first
    pub async fn get_operations_since(
        &self,
        user_id: &str,
        since: i64,
        exclude_device: &str,
        limit: u32,
    ) -> Result<Vec<SyncOperation>> {
        let rows = sqlx::query_as::<_, OperationRow>(
            r#"
            SELECT seq, id, device_id, operation_type, entity_type,
                   entity_id, payload, timestamp
            FROM sync_operations
            WHERE user_id = ? AND seq > ? AND device_id != ?
            ORDER BY seq ASC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(exclude_device)
        .bind(i64::from(limit))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_operation()).collect()
    }

    /// Latest log position for a user; 0 when the log is empty
    pub async fn latest_seq(&self, user_id: &str) -> Result<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(seq), 0) FROM sync_operations WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(self.pool)
                .await?;

        Ok(row.0)
    }
}

/// Internal row type for SQLite queries
#[derive(sqlx::FromRow)]
struct OperationRow {
    seq: i64,
    id: String,
    device_id: String,
    operation_type: String,
    entity_type: String,
    entity_id: String,
    payload: Option<String>,
    timestamp: String,
}

impl OperationRow {
    fn into_operation(self) -> Result<SyncOperation> {
        let operation_type = OperationType::parse(&self.operation_type).ok_or_else(|| {
            AppError::Internal(format!("Unknown operation type in log: {}", self.operation_type))
        })?;
        let entity_type = EntityType::parse(&self.entity_type).ok_or_else(|| {
            AppError::Internal(format!("Unknown entity type in log: {}", self.entity_type))
        })?;
        let payload = self
            .payload
            .map(|p| serde_json::from_str(&p))
            .transpose()?;

        Ok(SyncOperation {
            id: self.id,
            seq: Some(self.seq),
            operation_type,
            entity_type,
            entity_id: self.entity_id,
            payload,
            device_id: self.device_id,
            timestamp: from_db_time(&self.timestamp)?,
        })
    }
}
