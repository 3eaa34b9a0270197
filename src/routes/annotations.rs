//! Annotation API routes
//!
//! Bookmarks, highlights and notes share one listing and one edit/delete
//! surface; creation has a route per kind. Every write is appended to the
//! owner's sync log.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::annotations::{
    Annotation, AnnotationPatch, AnnotationQuery, AnnotationRepository, AnnotationType,
};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::sync::{EntityType, OperationType, SyncRepository};

use super::{require_book, required, JsonBody, QueryParams};

/// Create the annotations router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_annotations))
        .route("/bookmarks", post(create_bookmark))
        .route("/highlights", post(create_highlight))
        .route("/notes", post(create_note))
        .route("/:id", patch(update_annotation).delete(delete_annotation))
}

/// Query parameters for listing annotations
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub user_id: Option<String>,
    pub book_id: Option<String>,
    #[serde(rename = "type")]
    pub annotation_type: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Serialize)]
pub struct AnnotationsResponse {
    pub annotations: Vec<Annotation>,
}

#[derive(Serialize)]
pub struct AnnotationResponse {
    pub annotation: Annotation,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookmarkRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub book_id: String,
    #[validate(length(min = 1))]
    pub location: String,
    pub page: Option<u32>,
    #[validate(length(min = 1, max = 500))]
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateHighlightRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub book_id: String,
    #[validate(length(min = 1))]
    pub location: String,
    pub page: Option<u32>,
    #[validate(length(min = 1))]
    pub text: String,
    #[validate(length(min = 1, max = 32))]
    pub color: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub book_id: String,
    #[validate(length(min = 1))]
    pub location: String,
    pub page: Option<u32>,
    #[validate(length(min = 1))]
    pub text: String,
}

/// List annotations with optional filters
async fn list_annotations(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<AnnotationsResponse>> {
    let user_id = required(params.user_id, "userId")?;
    let annotation_type = params
        .annotation_type
        .map(|t| {
            AnnotationType::parse(&t)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown annotation type: {}", t)))
        })
        .transpose()?;

    let query = AnnotationQuery {
        user_id: Some(user_id),
        book_id: params.book_id,
        annotation_type,
        limit: params.limit,
        offset: params.offset,
    };

    let annotations = AnnotationRepository::new(state.db()).list(&query).await?;
    Ok(Json(AnnotationsResponse { annotations }))
}

/// Append an annotation write to its owner's sync log
async fn publish(
    state: &AppState,
    operation_type: OperationType,
    user_id: &str,
    id: &str,
    annotation: Option<&Annotation>,
) -> Result<()> {
    let payload = annotation.map(serde_json::to_value).transpose()?;
    SyncRepository::new(state.db())
        .record_server_change(user_id, operation_type, EntityType::Annotation, id, payload)
        .await?;
    Ok(())
}

async fn store(state: &AppState, annotation: Annotation) -> Result<(StatusCode, Json<AnnotationResponse>)> {
    AnnotationRepository::new(state.db()).insert(&annotation).await?;
    publish(
        state,
        OperationType::Create,
        &annotation.user_id,
        &annotation.id,
        Some(&annotation),
    )
    .await?;
    tracing::debug!(
        "Created {} {} in book {}",
        annotation.annotation_type().as_str(),
        annotation.id,
        annotation.book_id
    );
    Ok((StatusCode::CREATED, Json(AnnotationResponse { annotation })))
}

async fn create_bookmark(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateBookmarkRequest>,
) -> Result<(StatusCode, Json<AnnotationResponse>)> {
    req.validate()?;
    require_book(&state, &req.book_id, req.page).await?;

    let annotation = Annotation::new_bookmark(
        &req.user_id,
        &req.book_id,
        &req.location,
        req.page,
        &req.title,
        req.description.as_deref(),
    );
    store(&state, annotation).await
}

async fn create_highlight(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateHighlightRequest>,
) -> Result<(StatusCode, Json<AnnotationResponse>)> {
    req.validate()?;
    require_book(&state, &req.book_id, req.page).await?;

    let mut annotation = Annotation::new_highlight(
        &req.user_id,
        &req.book_id,
        &req.location,
        req.page,
        &req.text,
        req.color.as_deref(),
    );
    if req.note.is_some() {
        AnnotationPatch {
            note: req.note,
            ..Default::default()
        }
        .apply(&mut annotation)
        .map_err(|field| AppError::BadRequest(format!("Unexpected field: {}", field)))?;
    }
    store(&state, annotation).await
}

async fn create_note(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateNoteRequest>,
) -> Result<(StatusCode, Json<AnnotationResponse>)> {
    req.validate()?;
    require_book(&state, &req.book_id, req.page).await?;

    let annotation =
        Annotation::new_note(&req.user_id, &req.book_id, &req.location, req.page, &req.text);
    store(&state, annotation).await
}

/// Edit an annotation's content
async fn update_annotation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<AnnotationPatch>,
) -> Result<Json<AnnotationResponse>> {
    let repo = AnnotationRepository::new(state.db());
    let mut annotation = repo
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Annotation not found: {}", id)))?;

    let kind = annotation.annotation_type();
    patch.apply(&mut annotation).map_err(|field| {
        AppError::BadRequest(format!("A {} has no field '{}'", kind.as_str(), field))
    })?;

    if !repo.update(&annotation).await? {
        return Err(AppError::NotFound(format!("Annotation not found: {}", id)));
    }
    publish(
        &state,
        OperationType::Update,
        &annotation.user_id,
        &annotation.id,
        Some(&annotation),
    )
    .await?;
    Ok(Json(AnnotationResponse { annotation }))
}

/// Delete an annotation; unknown ids are not an error
async fn delete_annotation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let repo = AnnotationRepository::new(state.db());
    let Some(annotation) = repo.get(&id).await? else {
        tracing::debug!("Delete of unknown annotation {}", id);
        return Ok(StatusCode::NO_CONTENT);
    };

    if repo.delete(&id).await? {
        publish(&state, OperationType::Delete, &annotation.user_id, &id, None).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}
