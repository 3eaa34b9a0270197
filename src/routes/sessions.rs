//! Reading session API routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::ReadingSession;
use crate::error::Result;
use crate::progress::{EndSessionRequest, SessionRecorder, StartSessionRequest};
use crate::state::AppState;

use super::{require_book, required, JsonBody, QueryParams};

/// Create the sessions router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions).post(start_session))
        .route("/:id/end", post(end_session))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub user_id: Option<String>,
    pub book_id: Option<String>,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub session: ReadingSession,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsResponse {
    pub sessions: Vec<ReadingSession>,
    /// Seconds across the listed sessions
    pub total_time: u64,
}

async fn start_session(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<StartSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let book_id = required(Some(req.book_id.clone()), "bookId")?;
    require_book(&state, &book_id, None).await?;
    let session = SessionRecorder::new(state.db()).start_session(req).await?;
    Ok((StatusCode::CREATED, Json(SessionResponse { session })))
}

/// End a session; ending twice is a conflict
async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<EndSessionRequest>,
) -> Result<Json<SessionResponse>> {
    let session = SessionRecorder::new(state.db()).end_session(&id, req).await?;
    Ok(Json(SessionResponse { session }))
}

async fn list_sessions(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<SessionsResponse>> {
    let user_id = required(params.user_id, "userId")?;
    let recorder = SessionRecorder::new(state.db());

    let sessions = recorder
        .list_sessions(&user_id, params.book_id.as_deref())
        .await?;
    let total_time = recorder
        .total_time(&user_id, params.book_id.as_deref())
        .await?;

    Ok(Json(SessionsResponse {
        sessions,
        total_time,
    }))
}
