//! Server side of the sync protocol
//!
//! Pushed operations are checked as a batch before anything is written, then
//! applied one at a time with last-write-wins. Every applied operation is
//! appended to the log that other devices pull from.

use sqlx::SqlitePool;

use crate::annotations::{Annotation, AnnotationRepository};
use crate::db::{ProgressRepository, ReadingProgress};
use crate::error::{AppError, Result};

use super::conflict::ConflictResolver;
use super::store::{SyncRepository, PULL_BATCH_SIZE, SERVER_DEVICE_ID};
use super::types::{
    EntityType, OperationType, PullRequest, PullResponse, PushRequest,
    PushResponse, SyncOperation,
};

/// A pushed operation after validation
enum Change {
    Progress(ReadingProgress),
    SaveAnnotation(Annotation),
    DeleteAnnotation,
}

enum Outcome {
    /// Written; carries the payload to log
    Applied(Option<serde_json::Value>),
    /// Server copy kept; carries that copy
    Rejected(serde_json::Value),
}

pub struct SyncService<'a> {
    pool: &'a SqlitePool,
    resolver: ConflictResolver,
}

impl<'a> SyncService<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self {
            pool,
            resolver: ConflictResolver::new(),
        }
    }

    /// Apply a device's pending operations
    pub async fn push(&self, req: PushRequest) -> Result<PushResponse> {
        require_ids(&req.user_id, &req.device_id)?;

        let changes = req
            .operations
            .iter()
            .map(|op| parse_change(&req.user_id, op))
            .collect::<Result<Vec<_>>>()?;

        let log = SyncRepository::new(self.pool);
        let progress = ProgressRepository::new(self.pool);
        let annotations = AnnotationRepository::new(self.pool);
        let mut response = PushResponse::default();

        for change in &changes {
            if let Change::SaveAnnotation(annotation) = change {
                match annotations.owner_of(&annotation.id).await? {
                    Some(owner) if owner != req.user_id => {
                        return Err(AppError::BadRequest(format!(
                            "Annotation {} belongs to another user",
                            annotation.id
                        )))
                    }
                    _ => {}
                }
            }
        }

        for (op, change) in req.operations.into_iter().zip(changes) {
            let outcome = match change {
                Change::Progress(snapshot) => {
                    if progress.apply_snapshot(&snapshot).await? {
                        Outcome::Applied(Some(serde_json::to_value(&snapshot)?))
                    } else {
                        let current = progress.get(&snapshot.user_id, &snapshot.book_id).await?;
                        Outcome::Rejected(serde_json::to_value(current)?)
                    }
                }
                Change::SaveAnnotation(annotation) => {
                    if annotations.save_if_newer(&annotation).await? {
                        Outcome::Applied(Some(serde_json::to_value(&annotation)?))
                    } else {
                        let current = annotations.get_for_user(&annotation.id, &req.user_id).await?;
                        Outcome::Rejected(serde_json::to_value(current)?)
                    }
                }
                // No tombstones, so a delete never loses
                Change::DeleteAnnotation => {
                    annotations.delete_for_user(&op.entity_id, &req.user_id).await?;
                    Outcome::Applied(None)
                }
            };

            match outcome {
                Outcome::Applied(payload) => {
                    let logged = SyncOperation {
                        seq: None,
                        device_id: req.device_id.clone(),
                        payload,
                        ..op
                    };
                    log.record_operation(&req.user_id, &logged).await?;
                    response.accepted.push(logged.id);
                }
                Outcome::Rejected(server_data) => {
                    tracing::debug!(
                        "Push from {} lost to server copy of {}",
                        req.device_id,
                        op.record_key()
                    );
                    response.conflicts.push(self.resolver.conflict(&op, server_data));
                }
            }
        }

        response.cursor = log.latest_seq(&req.user_id).await?;
        tracing::info!(
            "Sync push from {}/{}: {} accepted, {} conflicts",
            req.user_id,
            req.device_id,
            response.accepted.len(),
            response.conflicts.len()
        );

        Ok(response)
    }

    /// Operations from the user's other devices since `req.since`
    pub async fn pull(&self, req: PullRequest) -> Result<PullResponse> {
        require_ids(&req.user_id, &req.device_id)?;

        let log = SyncRepository::new(self.pool);
        let mut operations = log
            .get_operations_since(&req.user_id, req.since, &req.device_id, PULL_BATCH_SIZE + 1)
            .await?;

        let has_more = operations.len() > PULL_BATCH_SIZE as usize;
        operations.truncate(PULL_BATCH_SIZE as usize);

        let cursor = operations
            .last()
            .and_then(|op| op.seq)
            .unwrap_or(req.since)
            .max(req.since);

        Ok(PullResponse {
            operations,
            cursor,
            has_more,
        })
    }
}

fn require_ids(user_id: &str, device_id: &str) -> Result<()> {
    if user_id.trim().is_empty() || device_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "userId and deviceId are required".to_string(),
        ));
    }
    if device_id == SERVER_DEVICE_ID {
        return Err(AppError::BadRequest(format!(
            "deviceId '{}' is reserved",
            SERVER_DEVICE_ID
        )));
    }
    Ok(())
}

fn parse_change(user_id: &str, op: &SyncOperation) -> Result<Change> {
    match (op.entity_type, op.operation_type) {
        (EntityType::Progress, OperationType::Delete) => Err(AppError::BadRequest(format!(
            "Operation {}: progress records cannot be deleted",
            op.id
        ))),
        (EntityType::Progress, _) => {
            let mut snapshot: ReadingProgress = payload(op)?;
            if snapshot.user_id != user_id || snapshot.book_id != op.entity_id {
                return Err(AppError::BadRequest(format!(
                    "Operation {}: payload does not match user and entity",
                    op.id
                )));
            }
            if !(0.0..=100.0).contains(&snapshot.percentage) {
                return Err(AppError::BadRequest(format!(
                    "Operation {}: percentage must be between 0 and 100",
                    op.id
                )));
            }
            if let (Some(page), Some(total)) = (snapshot.current_page, snapshot.total_pages) {
                if page == 0 || page > total {
                    return Err(AppError::BadRequest(format!(
                        "Operation {}: page {} is outside 1..={}",
                        op.id, page, total
                    )));
                }
            }
            snapshot.updated_at.get_or_insert(op.timestamp);
            Ok(Change::Progress(snapshot))
        }
        (EntityType::Annotation, OperationType::Delete) => Ok(Change::DeleteAnnotation),
        (EntityType::Annotation, _) => {
            let annotation: Annotation = payload(op)?;
            if annotation.user_id != user_id || annotation.id != op.entity_id {
                return Err(AppError::BadRequest(format!(
                    "Operation {}: payload does not match user and entity",
                    op.id
                )));
            }
            if annotation.location.trim().is_empty() {
                return Err(AppError::BadRequest(format!(
                    "Operation {}: annotation location is empty",
                    op.id
                )));
            }
            Ok(Change::SaveAnnotation(annotation))
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(op: &SyncOperation) -> Result<T> {
    let value = op.payload.clone().ok_or_else(|| {
        AppError::BadRequest(format!("Operation {} has no payload", op.id))
    })?;
    serde_json::from_value(value)
        .map_err(|e| AppError::BadRequest(format!("Operation {}: invalid payload: {}", op.id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{now, test_pool};
    use chrono::Duration;

    fn progress_op(device: &str, percentage: f64, updated_at: chrono::DateTime<chrono::Utc>) -> SyncOperation {
        progress_op_for("book-1", device, percentage, updated_at)
    }

    fn progress_op_for(
        book_id: &str,
        device: &str,
        percentage: f64,
        updated_at: chrono::DateTime<chrono::Utc>,
    ) -> SyncOperation {
        let mut snapshot = ReadingProgress::empty("user-1", book_id);
        snapshot.current_location = format!("loc-{}", percentage);
        snapshot.percentage = percentage;
        snapshot.updated_at = Some(updated_at);

        SyncOperation {
            id: uuid::Uuid::new_v4().to_string(),
            seq: None,
            operation_type: OperationType::Update,
            entity_type: EntityType::Progress,
            entity_id: book_id.to_string(),
            payload: Some(serde_json::to_value(&snapshot).unwrap()),
            device_id: device.to_string(),
            timestamp: updated_at,
        }
    }

    fn push(device: &str, operations: Vec<SyncOperation>) -> PushRequest {
        PushRequest {
            user_id: "user-1".to_string(),
            device_id: device.to_string(),
            operations,
        }
    }

    #[tokio::test]
    async fn test_older_snapshot_conflicts() {
        let pool = test_pool().await;
        let service = SyncService::new(&pool);
        let t = now();

        let first = service
            .push(push("phone", vec![progress_op("phone", 60.0, t)]))
            .await
            .unwrap();
        assert_eq!(first.accepted.len(), 1);
        assert!(first.cursor > 0);

        let stale = progress_op("tablet", 20.0, t - Duration::minutes(5));
        let second = service.push(push("tablet", vec![stale.clone()])).await.unwrap();
        assert!(second.accepted.is_empty());
        assert_eq!(second.conflicts.len(), 1);
        assert_eq!(second.conflicts[0].operation_id, stale.id);
        assert_eq!(second.conflicts[0].server_data["percentage"], 60.0);

        let stored = ProgressRepository::new(&pool)
            .get("user-1", "book-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.percentage, 60.0);
    }

    #[tokio::test]
    async fn test_newer_snapshot_wins() {
        let pool = test_pool().await;
        let service = SyncService::new(&pool);
        let t = now();

        service
            .push(push("phone", vec![progress_op("phone", 60.0, t)]))
            .await
            .unwrap();
        let resp = service
            .push(push("tablet", vec![progress_op("tablet", 75.0, t + Duration::seconds(1))]))
            .await
            .unwrap();
        assert_eq!(resp.accepted.len(), 1);

        let stored = ProgressRepository::new(&pool)
            .get("user-1", "book-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.percentage, 75.0);
    }

    #[tokio::test]
    async fn test_invalid_batch_writes_nothing() {
        let pool = test_pool().await;
        let service = SyncService::new(&pool);
        let t = now();

        let good = progress_op("phone", 10.0, t);
        let mut bad = progress_op("phone", 10.0, t);
        bad.entity_id = "book-2".to_string();

        let err = service.push(push("phone", vec![good, bad])).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(SyncRepository::new(&pool).latest_seq("user-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_annotation_delete_applies_unconditionally() {
        let pool = test_pool().await;
        let service = SyncService::new(&pool);

        let annotation = Annotation::new_note("user-1", "book-1", "loc", None, "text");
        AnnotationRepository::new(&pool).insert(&annotation).await.unwrap();

        let delete = SyncOperation {
            id: "op-del".to_string(),
            seq: None,
            operation_type: OperationType::Delete,
            entity_type: EntityType::Annotation,
            entity_id: annotation.id.clone(),
            payload: None,
            device_id: "phone".to_string(),
            timestamp: annotation.updated_at - Duration::hours(1),
        };
        let resp = service.push(push("phone", vec![delete])).await.unwrap();
        assert_eq!(resp.accepted, vec!["op-del".to_string()]);
        assert!(AnnotationRepository::new(&pool).get(&annotation.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pull_skips_requesting_device_and_pages() {
        let pool = test_pool().await;
        let service = SyncService::new(&pool);
        let t = now();

        let ops: Vec<_> = (0..(PULL_BATCH_SIZE + 5))
            .map(|i| progress_op_for(&format!("book-{}", i), "phone", 1.0, t + Duration::milliseconds(i as i64)))
            .collect();
        service.push(push("phone", ops)).await.unwrap();

        let own = service
            .pull(PullRequest {
                user_id: "user-1".to_string(),
                device_id: "phone".to_string(),
                since: 0,
            })
            .await
            .unwrap();
        assert!(own.operations.is_empty());
        assert!(!own.has_more);

        let first = service
            .pull(PullRequest {
                user_id: "user-1".to_string(),
                device_id: "tablet".to_string(),
                since: 0,
            })
            .await
            .unwrap();
        assert_eq!(first.operations.len(), PULL_BATCH_SIZE as usize);
        assert!(first.has_more);

        let rest = service
            .pull(PullRequest {
                user_id: "user-1".to_string(),
                device_id: "tablet".to_string(),
                since: first.cursor,
            })
            .await
            .unwrap();
        assert_eq!(rest.operations.len(), 5);
        assert!(!rest.has_more);
        assert!(rest.cursor > first.cursor);
    }

    fn annotation_op(id: &str, annotation: &Annotation) -> SyncOperation {
        SyncOperation {
            id: id.to_string(),
            seq: None,
            operation_type: OperationType::Update,
            entity_type: EntityType::Annotation,
            entity_id: annotation.id.clone(),
            payload: Some(serde_json::to_value(annotation).unwrap()),
            device_id: "laptop".to_string(),
            timestamp: annotation.updated_at,
        }
    }

    #[tokio::test]
    async fn test_push_cannot_touch_another_users_annotation() {
        let pool = test_pool().await;
        let service = SyncService::new(&pool);
        let repo = AnnotationRepository::new(&pool);

        let private = Annotation::new_note("alice", "book-1", "loc", None, "alice private note");
        repo.insert(&private).await.unwrap();

        for offset in [Duration::hours(-1), Duration::hours(1)] {
            let mut forged = private.clone();
            forged.user_id = "bob".to_string();
            forged.content = crate::annotations::AnnotationContent::Note {
                text: "rewritten".to_string(),
            };
            forged.updated_at = private.updated_at + offset;

            let err = service
                .push(PushRequest {
                    user_id: "bob".to_string(),
                    device_id: "laptop".to_string(),
                    operations: vec![annotation_op("op-forged", &forged)],
                })
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
        }

        assert_eq!(repo.get(&private.id).await.unwrap().unwrap(), private);
        assert_eq!(SyncRepository::new(&pool).latest_seq("bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_server_device_id_is_reserved() {
        let pool = test_pool().await;
        let err = SyncService::new(&pool)
            .pull(PullRequest {
                user_id: "user-1".to_string(),
                device_id: SERVER_DEVICE_ID.to_string(),
                since: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
