//! Sync API endpoints
//!
//! Provides endpoints for multi-device synchronization.

use axum::{extract::State, routing::post, Json, Router};

use crate::error::Result;
use crate::state::AppState;
use crate::sync::{PullRequest, PullResponse, PushRequest, PushResponse, SyncService};

use super::JsonBody;

/// Create the sync router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/push", post(push_changes))
        .route("/pull", post(pull_changes))
}

/// Push local changes to server
async fn push_changes(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<PushRequest>,
) -> Result<Json<PushResponse>> {
    let response = SyncService::new(state.db()).push(req).await?;
    Ok(Json(response))
}

/// Pull changes from server
async fn pull_changes(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<PullRequest>,
) -> Result<Json<PullResponse>> {
    let response = SyncService::new(state.db()).pull(req).await?;
    Ok(Json(response))
}
