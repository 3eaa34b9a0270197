//! Conflict resolution
//!
//! Last-write-wins by record timestamp. A device change replaces the server
//! copy only when it is strictly newer; ties keep the server copy.

use chrono::{DateTime, Utc};

use super::types::{Conflict, ConflictResolution, OperationType, SyncOperation};

/// Last-write-wins conflict resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Whether the server copy beats a device change.
    ///
    /// `server` is `None` when the server holds no copy of the record.
    pub fn server_wins(&self, server: Option<DateTime<Utc>>, device: DateTime<Utc>) -> bool {
        match server {
            Some(server) => device <= server,
            None => false,
        }
    }

    /// Whether a remote operation should replace the copy a device holds.
    ///
    /// Deletes always apply since no tombstones are kept.
    pub fn remote_applies(&self, op: &SyncOperation, remote: DateTime<Utc>, local: Option<DateTime<Utc>>) -> bool {
        match (op.operation_type, local) {
            (OperationType::Delete, _) | (_, None) => true,
            (_, Some(local)) => self.server_wins(Some(remote), local),
        }
    }

    /// Build the conflict returned to the pushing device
    pub fn conflict(&self, op: &SyncOperation, server_data: serde_json::Value) -> Conflict {
        Conflict {
            operation_id: op.id.clone(),
            entity_type: op.entity_type,
            entity_id: op.entity_id.clone(),
            server_data,
            resolution: ConflictResolution::UseServer,
        }
    }
}
