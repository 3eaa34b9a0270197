//! Reading progress API routes

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::db::ReadingProgress;
use crate::error::Result;
use crate::progress::{ProgressTracker, ProgressUpdate};
use crate::state::AppState;

use super::{JsonBody, QueryParams};

/// Create the progress router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:user_id", get(list_all_progress))
        .route("/:user_id/recent", get(recent_progress))
        .route("/:user_id/:book_id", get(get_progress).put(update_progress))
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    pub limit: Option<u32>,
}

/// List all progress for a reader
async fn list_all_progress(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ReadingProgress>>> {
    let progress = ProgressTracker::new(state.db()).list_progress(&user_id).await?;
    Ok(Json(progress))
}

/// Get progress for a specific book; zero progress if never opened
async fn get_progress(
    State(state): State<AppState>,
    Path((user_id, book_id)): Path<(String, String)>,
) -> Result<Json<ReadingProgress>> {
    let progress = ProgressTracker::new(state.db())
        .get_progress(&user_id, &book_id)
        .await?;
    Ok(Json(progress))
}

/// Record a progress tick
async fn update_progress(
    State(state): State<AppState>,
    Path((user_id, book_id)): Path<(String, String)>,
    JsonBody(update): JsonBody<ProgressUpdate>,
) -> Result<Json<ReadingProgress>> {
    let progress = ProgressTracker::new(state.db())
        .record_progress(&user_id, &book_id, update)
        .await?;
    Ok(Json(progress))
}

/// Get recently read books
async fn recent_progress(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    QueryParams(params): QueryParams<RecentParams>,
) -> Result<Json<Vec<ReadingProgress>>> {
    let progress = ProgressTracker::new(state.db())
        .recent(&user_id, params.limit)
        .await?;
    Ok(Json(progress))
}
