//! Reader preferences and statistics

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use validator::Validate;

use crate::db::{PreferencesRepository, ProgressRepository, ReaderPreferences};
use crate::error::Result;
use crate::progress::{ProgressTracker, ReadingStats, SessionRecorder};
use crate::state::AppState;

use super::JsonBody;

/// Create the users router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:user_id/preferences", get(get_preferences).put(save_preferences))
        .route("/:user_id/stats", get(get_stats))
}

/// Stored preferences, or the defaults
async fn get_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ReaderPreferences>> {
    let preferences = PreferencesRepository::new(state.db())
        .get(&user_id)
        .await?
        .unwrap_or_default();
    Ok(Json(preferences))
}

async fn save_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    JsonBody(preferences): JsonBody<ReaderPreferences>,
) -> Result<Json<ReaderPreferences>> {
    preferences.validate()?;
    PreferencesRepository::new(state.db())
        .save(&user_id, &preferences)
        .await?;
    Ok(Json(preferences))
}

async fn get_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ReadingStats>> {
    let progress = ProgressTracker::new(state.db()).list_progress(&user_id).await?;
    let sessions = SessionRecorder::new(state.db())
        .list_sessions(&user_id, None)
        .await?;
    let total_reading_time = ProgressRepository::new(state.db()).total_time(&user_id).await?;

    // Books removed from the catalogue simply contribute no categories
    let mut categories = Vec::with_capacity(progress.len());
    for record in &progress {
        if let Some(book) = state.books().get(&record.book_id).await? {
            categories.push(book.categories);
        }
    }

    Ok(Json(ReadingStats::compute(
        &progress,
        &sessions,
        &categories,
        total_reading_time,
        Utc::now().date_naive(),
    )))
}
