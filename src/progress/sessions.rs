//! Reading sessions
//!
//! A session runs from the moment a book is opened until it is closed. Its
//! duration is computed when it ends, and a session ends only once.

use serde::Deserialize;
use sqlx::SqlitePool;

use crate::db::{ReadingSession, SessionRepository};
use crate::error::{AppError, Result};

/// Body of `POST /api/sessions`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub user_id: String,
    pub book_id: String,
    #[serde(default)]
    pub location_start: String,
}

/// Body of `POST /api/sessions/:id/end`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionRequest {
    #[serde(default)]
    pub location_end: String,
    #[serde(default)]
    pub pages_read: u32,
}

/// Start and end reading sessions
pub struct SessionRecorder<'a> {
    repo: SessionRepository<'a>,
}

impl<'a> SessionRecorder<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self {
            repo: SessionRepository::new(pool),
        }
    }

    pub async fn start_session(&self, req: StartSessionRequest) -> Result<ReadingSession> {
        if req.user_id.trim().is_empty() || req.book_id.trim().is_empty() {
            return Err(AppError::BadRequest(
                "userId and bookId are required".to_string(),
            ));
        }
        let session = self
            .repo
            .start(&req.user_id, &req.book_id, &req.location_start)
            .await?;
        tracing::debug!("Session {} started for {}/{}", session.id, req.user_id, req.book_id);
        Ok(session)
    }

    /// End a session; a session can only be ended once
    pub async fn end_session(&self, session_id: &str, req: EndSessionRequest) -> Result<ReadingSession> {
        let session = self
            .repo
            .end(session_id, &req.location_end, req.pages_read)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", session_id)))?;
        tracing::debug!("Session {} ended after {}s", session.id, session.duration);
        Ok(session)
    }

    pub async fn list_sessions(&self, user_id: &str, book_id: Option<&str>) -> Result<Vec<ReadingSession>> {
        self.repo.list(user_id, book_id).await
    }

    /// Seconds spent in finished sessions
    pub async fn total_time(&self, user_id: &str, book_id: Option<&str>) -> Result<u64> {
        self.repo.total_time(user_id, book_id).await
    }
}
