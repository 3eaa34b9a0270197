//! Sync data types
//!
//! Defines the wire types for multi-device synchronization:
//! - Operations recorded in the server-side log
//! - Push and pull requests with their responses
//! - Conflicts returned when the server copy wins

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Types of sync operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(OperationType::Create),
            "update" => Some(OperationType::Update),
            "delete" => Some(OperationType::Delete),
            _ => None,
        }
    }
}

/// Types of entities that can be synced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Keyed by book id: a reader has one progress record per book
    Progress,
    /// Keyed by annotation id
    Annotation,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Progress => "progress",
            EntityType::Annotation => "annotation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "progress" => Some(EntityType::Progress),
            "annotation" => Some(EntityType::Annotation),
            _ => None,
        }
    }
}

/// A sync operation representing a change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Unique operation ID, chosen by the device
    pub id: String,
    /// Position in the server log; absent until the server accepts it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    pub entity_type: EntityType,
    pub entity_id: String,
    /// Full entity snapshot; absent for deletes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Device that made this change
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
}

impl SyncOperation {
    /// Key identifying the record this operation touches
    pub fn record_key(&self) -> RecordKey {
        RecordKey::new(self.entity_type, &self.entity_id)
    }
}

/// Identity of one synced record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl RecordKey {
    pub fn new(entity_type: EntityType, entity_id: &str) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.to_string(),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type.as_str(), self.entity_id)
    }
}

/// Request to push changes to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub user_id: String,
    pub device_id: String,
    pub operations: Vec<SyncOperation>,
}

/// Response from push operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// IDs of operations that were applied
    pub accepted: Vec<String>,
    /// Operations rejected because the server copy is at least as recent
    pub conflicts: Vec<Conflict>,
    /// Latest log position for the user after the push
    pub cursor: i64,
}

/// Request to pull changes from server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub user_id: String,
    pub device_id: String,
    /// Log position the device has already seen
    #[serde(default)]
    pub since: i64,
}

/// Response from pull operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub operations: Vec<SyncOperation>,
    /// Position to pass as `since` on the next pull
    pub cursor: i64,
    /// Whether there are more changes available
    pub has_more: bool,
}

/// A pushed operation that lost to the server copy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub operation_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    /// The server copy the device should adopt
    pub server_data: serde_json::Value,
    pub resolution: ConflictResolution,
}

/// How to resolve a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Keep the server version
    UseServer,
    /// Keep the local version
    UseLocal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_wire_format() {
        let op = SyncOperation {
            id: "op-1".to_string(),
            seq: None,
            operation_type: OperationType::Delete,
            entity_type: EntityType::Annotation,
            entity_id: "ann-1".to_string(),
            payload: None,
            device_id: "tablet".to_string(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "delete");
        assert_eq!(json["entityType"], "annotation");
        assert_eq!(json["deviceId"], "tablet");
        assert!(json.get("seq").is_none());
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn test_pull_request_defaults_since() {
        let req: PullRequest =
            serde_json::from_str(r#"{"userId":"u","deviceId":"d"}"#).unwrap();
        assert_eq!(req.since, 0);
    }

    #[test]
    fn test_record_key_display() {
        let key = RecordKey::new(EntityType::Progress, "book-9");
        assert_eq!(key.to_string(), "progress:book-9");
    }
}
