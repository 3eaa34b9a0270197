//! Offline-first local state
//!
//! Every write lands here first and queues an operation for the next push.
//! The queue holds at most one operation per record; a newer local write
//! replaces the queued one.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::annotations::Annotation;
use crate::db::{now, ReadingProgress};
use crate::progress::ProgressUpdate;

use super::client::SyncError;
use super::conflict::ConflictResolver;
use super::types::{Conflict, EntityType, OperationType, RecordKey, SyncOperation};

/// Local copy of one user's reading data on one device
pub struct LocalStore {
    user_id: String,
    device_id: String,
    resolver: ConflictResolver,
    state: RwLock<LocalState>,
}

#[derive(Default)]
struct LocalState {
    /// Keyed by book id
    progress: HashMap<String, ReadingProgress>,
    annotations: HashMap<String, Annotation>,
    pending: Vec<SyncOperation>,
    /// Server log position already pulled
    cursor: i64,
}

impl LocalState {
    fn queue(&mut self, op: SyncOperation) {
        let key = op.record_key();
        self.pending.retain(|queued| queued.record_key() != key);
        self.pending.push(op);
    }

    fn drop_pending(&mut self, key: &RecordKey) {
        self.pending.retain(|queued| &queued.record_key() != key);
    }
}

impl LocalStore {
    pub fn new(user_id: &str, device_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            resolver: ConflictResolver::new(),
            state: RwLock::new(LocalState::default()),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    fn operation(
        &self,
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
            device_id: self.device_id.clone(),
            timestamp: now(),
        }
    }

    /// Apply a progress tick locally and queue it for the server
    pub async fn record_progress(
        &self,
        book_id: &str,
        update: ProgressUpdate,
    ) -> Result<ReadingProgress, SyncError> {
        let tick = update
            .into_tick()
            .map_err(|e| SyncError::Invalid(e.to_string()))?;

        let mut state = self.state.write().await;
        let existing = state.progress.get(book_id).cloned();
        let operation_type = if existing.is_some() {
            OperationType::Update
        } else {
            OperationType::Create
        };

        let mut progress =
            existing.unwrap_or_else(|| ReadingProgress::empty(&self.user_id, book_id));
        let stamp = next_stamp(progress.updated_at);
        progress.current_location = tick.location;
        progress.percentage = tick.percentage;
        progress.current_page = tick.current_page;
        progress.total_pages = tick.total_pages;
        progress.time_spent += tick.time_spent_delta;
        progress.last_read_at = Some(stamp);
        progress.created_at.get_or_insert(stamp);
        progress.updated_at = Some(stamp);

        let op = self.operation(
            operation_type,
            EntityType::Progress,
            book_id,
            Some(serde_json::to_value(&progress)?),
        );
        state.progress.insert(book_id.to_string(), progress.clone());
        state.queue(op);

        Ok(progress)
    }

    pub async fn progress(&self, book_id: &str) -> Option<ReadingProgress> {
        self.state.read().await.progress.get(book_id).cloned()
    }

    /// Store a new or edited annotation locally and queue it
    pub async fn save_annotation(&self, mut annotation: Annotation) -> Result<Annotation, SyncError> {
        if annotation.user_id != self.user_id {
            return Err(SyncError::Invalid(format!(
                "Annotation {} belongs to another user",
                annotation.id
            )));
        }
        if annotation.location.trim().is_empty() {
            return Err(SyncError::Invalid("Annotation location is empty".to_string()));
        }

        let mut state = self.state.write().await;
        let existing = state.annotations.get(&annotation.id).map(|a| a.updated_at);
        let operation_type = if existing.is_some() {
            OperationType::Update
        } else {
            OperationType::Create
        };
        annotation.updated_at = next_stamp(existing).max(annotation.updated_at);

        let op = self.operation(
            operation_type,
            EntityType::Annotation,
            &annotation.id,
            Some(serde_json::to_value(&annotation)?),
        );
        state.annotations.insert(annotation.id.clone(), annotation.clone());
        state.queue(op);

        Ok(annotation)
    }

    /// Remove an annotation locally; unknown ids are not an error
    pub async fn delete_annotation(&self, id: &str) {
        let mut state = self.state.write().await;
        state.annotations.remove(id);
        let op = self.operation(OperationType::Delete, EntityType::Annotation, id, None);
        state.queue(op);
    }

    /// Annotations for a book, oldest first
    pub async fn annotations(&self, book_id: &str) -> Vec<Annotation> {
        let state = self.state.read().await;
        let mut annotations: Vec<_> = state
            .annotations
            .values()
            .filter(|a| a.book_id == book_id)
            .cloned()
            .collect();
        annotations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        annotations
    }

    /// Records with a queued operation
    pub async fn pending_keys(&self) -> Vec<RecordKey> {
        self.state
            .read()
            .await
            .pending
            .iter()
            .map(SyncOperation::record_key)
            .collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.read().await.pending.len()
    }

    /// Remove and return the queued operations for the given records
    pub async fn take_pending(&self, keys: &[RecordKey]) -> Vec<SyncOperation> {
        let mut state = self.state.write().await;
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
            .into_iter()
            .partition(|op| keys.contains(&op.record_key()));
        state.pending = kept;
        taken
    }

    /// Put back operations whose push failed.
    ///
    /// An operation is dropped if a newer write to the same record was queued
    /// in the meantime.
    pub async fn requeue(&self, ops: Vec<SyncOperation>) {
        let mut state = self.state.write().await;
        let mut restored: Vec<_> = ops
            .into_iter()
            .filter(|op| {
                let key = op.record_key();
                !state.pending.iter().any(|queued| queued.record_key() == key)
            })
            .collect();
        restored.append(&mut state.pending);
        state.pending = restored;
    }

    pub async fn cursor(&self) -> i64 {
        self.state.read().await.cursor
    }

    pub async fn set_cursor(&self, cursor: i64) {
        let mut state = self.state.write().await;
        state.cursor = state.cursor.max(cursor);
    }

    /// Apply an operation pulled from another device.
    ///
    /// Returns `false` when the local copy is newer and was kept.
    pub async fn apply_remote(&self, op: &SyncOperation) -> Result<bool, SyncError> {
        let mut state = self.state.write().await;
        let key = op.record_key();

        let applied = match (op.entity_type, op.operation_type) {
            (EntityType::Annotation, OperationType::Delete) => {
                state.annotations.remove(&op.entity_id);
                true
            }
            // Only the server deletes progress, when the book goes away
            (EntityType::Progress, OperationType::Delete) => {
                state.progress.remove(&op.entity_id);
                true
            }
            (EntityType::Progress, _) => {
                let remote: ReadingProgress = remote_payload(op)?;
                let remote_at = remote.updated_at.unwrap_or(op.timestamp);
                let local_at = state.progress.get(&op.entity_id).and_then(|p| p.updated_at);
                let applies = self.resolver.remote_applies(op, remote_at, local_at);
                if applies {
                    state.progress.insert(op.entity_id.clone(), remote);
                }
                applies
            }
            (EntityType::Annotation, _) => {
                let remote: Annotation = remote_payload(op)?;
                let local_at = state.annotations.get(&op.entity_id).map(|a| a.updated_at);
                let applies = self.resolver.remote_applies(op, remote.updated_at, local_at);
                if applies {
                    state.annotations.insert(op.entity_id.clone(), remote);
                }
                applies
            }
        };

        if applied {
            // The queued local write would lose on the server anyway
            state.drop_pending(&key);
        }
        Ok(applied)
    }

    /// Adopt the server copy returned with a rejected push
    pub async fn adopt(&self, conflict: &Conflict) -> Result<(), SyncError> {
        if conflict.server_data.is_null() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        let key = RecordKey::new(conflict.entity_type, &conflict.entity_id);

        let adopted = match conflict.entity_type {
            EntityType::Progress => {
                let server: ReadingProgress = serde_json::from_value(conflict.server_data.clone())?;
                let local_at = state.progress.get(&conflict.entity_id).and_then(|p| p.updated_at);
                let take = match (server.updated_at, local_at) {
                    (_, None) => true,
                    (server_at, Some(local_at)) => self.resolver.server_wins(server_at, local_at),
                };
                if take {
                    state.progress.insert(conflict.entity_id.clone(), server);
                }
                take
            }
            EntityType::Annotation => {
                let server: Annotation = serde_json::from_value(conflict.server_data.clone())?;
                let local_at = state.annotations.get(&conflict.entity_id).map(|a| a.updated_at);
                let take = match local_at {
                    None => true,
                    Some(local_at) => self.resolver.server_wins(Some(server.updated_at), local_at),
                };
                if take {
                    state.annotations.insert(conflict.entity_id.clone(), server);
                }
                take
            }
        };

        if adopted {
            state.drop_pending(&key);
            tracing::debug!("Adopted server copy of {}", key);
        }
        Ok(())
    }
}

/// A timestamp strictly after `previous`, so successive local writes order
fn next_stamp(previous: Option<chrono::DateTime<chrono::Utc>>) -> chrono::DateTime<chrono::Utc> {
    let now = now();
    match previous {
        Some(previous) if now <= previous => previous + chrono::Duration::microseconds(1),
        _ => now,
    }
}

fn remote_payload<T: serde::de::DeserializeOwned>(op: &SyncOperation) -> Result<T, SyncError> {
    let value = op
        .payload
        .clone()
        .ok_or_else(|| SyncError::Invalid(format!("Operation {} has no payload", op.id)))?;
    Ok(serde_json::from_value(value)?)
}
