//! Reading progress and session database operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};

use super::{from_db_time, now, to_db_time};

/// Reading progress record for one reader and book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    /// Absent until the first progress tick is stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub book_id: String,
    pub user_id: String,
    /// Opaque locator produced by the viewer
    pub current_location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    pub percentage: f64,
    /// Seconds spent reading
    pub time_spent: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_read_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ReadingProgress {
    /// Zero progress for a book that has never been opened
    pub fn empty(user_id: &str, book_id: &str) -> Self {
        Self {
            id: None,
            book_id: book_id.to_string(),
            user_id: user_id.to_string(),
            current_location: String::new(),
            current_page: None,
            total_pages: None,
            percentage: 0.0,
            time_spent: 0,
            last_read_at: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// A validated progress tick
#[derive(Debug, Clone)]
pub struct ProgressTick {
    pub location: String,
    pub percentage: f64,
    pub current_page: Option<u32>,
    pub total_pages: Option<u32>,
    /// Seconds to add to the running total
    pub time_spent_delta: u64,
}

const PROGRESS_COLUMNS: &str = r#"
    id, book_id, user_id, current_location, current_page, total_pages,
    percentage, time_spent, last_read_at, created_at, updated_at
"#;

/// Progress repository
pub struct ProgressRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ProgressRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get progress for a specific book
    pub async fn get(&self, user_id: &str, book_id: &str) -> Result<Option<ReadingProgress>> {
        let row = sqlx::query_as::<_, ProgressRow>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM reading_progress WHERE user_id = ? AND book_id = ?"
        ))
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(ProgressRow::into_progress).transpose()
    }

    /// Get all progress for a user
    pub async fn list(&self, user_id: &str) -> Result<Vec<ReadingProgress>> {
        let rows = sqlx::query_as::<_, ProgressRow>(&format!(
            r#"
            SELECT {PROGRESS_COLUMNS}
            FROM reading_progress
            WHERE user_id = ?
            ORDER BY last_read_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(ProgressRow::into_progress).collect()
    }

    /// Get the most recently read books
    pub async fn recent(&self, user_id: &str, limit: u32) -> Result<Vec<ReadingProgress>> {
        let rows = sqlx::query_as::<_, ProgressRow>(&format!(
            r#"
            SELECT {PROGRESS_COLUMNS}
            FROM reading_progress
            WHERE user_id = ? AND percentage > 0
            ORDER BY last_read_at DESC
            LIMIT ?
            "#
        ))
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(ProgressRow::into_progress).collect()
    }

    /// Record a progress tick, creating the row on first use.
    ///
    /// The time delta accumulates into `time_spent`; everything else is
    /// replaced by the tick.
    pub async fn record(
        &self,
        user_id: &str,
        book_id: &str,
        tick: &ProgressTick,
    ) -> Result<ReadingProgress> {
        let now = to_db_time(now());
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO reading_progress (
                id, book_id, user_id, current_location, current_page, total_pages,
                percentage, time_spent, last_read_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, book_id) DO UPDATE SET
                current_location = excluded.current_location,
                current_page = excluded.current_page,
                total_pages = excluded.total_pages,
                percentage = excluded.percentage,
                time_spent = reading_progress.time_spent + excluded.time_spent,
                last_read_at = excluded.last_read_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(book_id)
        .bind(user_id)
        .bind(&tick.location)
        .bind(tick.current_page.map(i64::from))
        .bind(tick.total_pages.map(i64::from))
        .bind(tick.percentage)
        .bind(tick.time_spent_delta as i64)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        // Fetch the updated record
        self.get(user_id, book_id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch upserted progress".to_string()))
    }

    /// Store a full progress snapshot if it is newer than the stored row.
    ///
    /// Returns `false` when the stored row has an equal or later `updated_at`.
    pub async fn apply_snapshot(&self, progress: &ReadingProgress) -> Result<bool> {
        let updated_at = progress
            .updated_at
            .ok_or_else(|| AppError::BadRequest("Progress snapshot needs updatedAt".to_string()))?;
        let updated = to_db_time(updated_at);
        let last_read = to_db_time(progress.last_read_at.unwrap_or(updated_at));
        let created = to_db_time(progress.created_at.unwrap_or(updated_at));
        let id = progress
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO reading_progress (
                id, book_id, user_id, current_location, current_page, total_pages,
                percentage, time_spent, last_read_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, book_id) DO UPDATE SET
                current_location = excluded.current_location,
                current_page = excluded.current_page,
                total_pages = excluded.total_pages,
                percentage = excluded.percentage,
                time_spent = excluded.time_spent,
                last_read_at = excluded.last_read_at,
                updated_at = excluded.updated_at
            WHERE excluded.updated_at > reading_progress.updated_at
            "#,
        )
        .bind(&id)
        .bind(&progress.book_id)
        .bind(&progress.user_id)
        .bind(&progress.current_location)
        .bind(progress.current_page.map(i64::from))
        .bind(progress.total_pages.map(i64::from))
        .bind(progress.percentage)
        .bind(progress.time_spent as i64)
        .bind(&last_read)
        .bind(&created)
        .bind(&updated)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Total seconds read across all of a user's books
    pub async fn total_time(&self, user_id: &str) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(time_spent), 0) FROM reading_progress WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        Ok(row.0.max(0) as u64)
    }
}

#[derive(sqlx::FromRow)]
struct ProgressRow {
    id: String,
    book_id: String,
    user_id: String,
    current_location: String,
    current_page: Option<i64>,
    total_pages: Option<i64>,
    percentage: f64,
    time_spent: i64,
    last_read_at: String,
    created_at: String,
    updated_at: String,
}

impl ProgressRow {
    fn into_progress(self) -> Result<ReadingProgress> {
        Ok(ReadingProgress {
            id: Some(self.id),
            book_id: self.book_id,
            user_id: self.user_id,
            current_location: self.current_location,
            current_page: self.current_page.map(|p| p.max(0) as u32),
            total_pages: self.total_pages.map(|p| p.max(0) as u32),
            percentage: self.percentage,
            time_spent: self.time_spent.max(0) as u64,
            last_read_at: Some(from_db_time(&self.last_read_at)?),
            created_at: Some(from_db_time(&self.created_at)?),
            updated_at: Some(from_db_time(&self.updated_at)?),
        })
    }
}

/// Reading session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingSession {
    pub id: String,
    pub book_id: String,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds between start and end; zero while the session is open
    pub duration: u64,
    pub pages_read: u32,
    pub location_start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_end: Option<String>,
}

const SESSION_COLUMNS: &str = r#"
    id, book_id, user_id, start_time, end_time, duration, pages_read,
    location_start, location_end
"#;

/// Session repository
pub struct SessionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SessionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Start a new reading session
    pub async fn start(
        &self,
        user_id: &str,
        book_id: &str,
        location_start: &str,
    ) -> Result<ReadingSession> {
        let session = ReadingSession {
            id: Uuid::new_v4().to_string(),
            book_id: book_id.to_string(),
            user_id: user_id.to_string(),
            start_time: now(),
            end_time: None,
            duration: 0,
            pages_read: 0,
            location_start: location_start.to_string(),
            location_end: None,
        };

        sqlx::query(
            r#"
            INSERT INTO reading_sessions (id, book_id, user_id, start_time, location_start)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.book_id)
        .bind(&session.user_id)
        .bind(to_db_time(session.start_time))
        .bind(&session.location_start)
        .execute(self.pool)
        .await?;

        Ok(session)
    }

    /// Get a session by ID
    pub async fn get(&self, session_id: &str) -> Result<Option<ReadingSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM reading_sessions WHERE id = ?"
        ))
        .bind(session_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(SessionRow::into_session).transpose()
    }

    /// End a reading session.
    ///
    /// Returns `None` for an unknown session and a conflict error when the
    /// session was already ended.
    pub async fn end(
        &self,
        session_id: &str,
        location_end: &str,
        pages_read: u32,
    ) -> Result<Option<ReadingSession>> {
        let Some(session) = self.get(session_id).await? else {
            return Ok(None);
        };
        if session.end_time.is_some() {
            return Err(AppError::Conflict(format!("Session {} already ended", session_id)));
        }

        let end_time = now().max(session.start_time);
        let duration = (end_time - session.start_time).num_seconds().max(0);

        let result = sqlx::query(
            r#"
            UPDATE reading_sessions
            SET end_time = ?,
                duration = ?,
                pages_read = ?,
                location_end = ?
            WHERE id = ? AND end_time IS NULL
            "#,
        )
        .bind(to_db_time(end_time))
        .bind(duration)
        .bind(i64::from(pages_read))
        .bind(location_end)
        .bind(session_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!("Session {} already ended", session_id)));
        }

        Ok(Some(ReadingSession {
            end_time: Some(end_time),
            duration: duration as u64,
            pages_read,
            location_end: Some(location_end.to_string()),
            ..session
        }))
    }

    /// Get sessions for a reader, optionally narrowed to one book
    pub async fn list(&self, user_id: &str, book_id: Option<&str>) -> Result<Vec<ReadingSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM reading_sessions
            WHERE user_id = ? AND (? IS NULL OR book_id = ?)
            ORDER BY start_time DESC
            "#
        ))
        .bind(user_id)
        .bind(book_id)
        .bind(book_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }

    /// Get total session time, optionally for one book
    pub async fn total_time(&self, user_id: &str, book_id: Option<&str>) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(duration), 0)
            FROM reading_sessions
            WHERE user_id = ? AND (? IS NULL OR book_id = ?)
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(book_id)
        .fetch_one(self.pool)
        .await?;

        Ok(row.0.max(0) as u64)
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    book_id: String,
    user_id: String,
    start_time: String,
    end_time: Option<String>,
    duration: i64,
    pages_read: i64,
    location_start: String,
    location_end: Option<String>,
}

impl SessionRow {
    fn into_session(self) -> Result<ReadingSession> {
        Ok(ReadingSession {
            id: self.id,
            book_id: self.book_id,
            user_id: self.user_id,
            start_time: from_db_time(&self.start_time)?,
            end_time: self.end_time.as_deref().map(from_db_time).transpose()?,
            duration: self.duration.max(0) as u64,
            pages_read: self.pages_read.max(0) as u32,
            location_start: self.location_start,
            location_end: self.location_end,
        })
    }
}
