//! Progress ticks from the reader
//!
//! A tick carries the viewer's opaque locator, the percentage and the time
//! read since the previous tick. Each stored tick is also appended to the sync
//! log so the reader's other devices pull it.

use serde::Deserialize;
use sqlx::SqlitePool;

use crate::db::{ProgressRepository, ProgressTick, ReadingProgress};
use crate::error::{AppError, Result};
use crate::sync::{EntityType, OperationType, SyncRepository};

/// Default number of entries for the "continue reading" list
pub const DEFAULT_RECENT_LIMIT: u32 = 10;

/// Body of `PUT /api/progress/:userId/:bookId`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    #[serde(alias = "location")]
    pub current_location: String,
    pub percentage: f64,
    pub current_page: Option<u32>,
    pub total_pages: Option<u32>,
    /// Seconds read since the previous tick
    #[serde(default)]
    pub time_spent_delta: i64,
}

impl ProgressUpdate {
    /// Reject out-of-range values; nothing is clamped
    pub fn into_tick(self) -> Result<ProgressTick> {
        if !(0.0..=100.0).contains(&self.percentage) {
            // NaN fails the range check as well
            return Err(AppError::BadRequest(format!(
                "Percentage must be between 0 and 100, got {}",
                self.percentage
            )));
        }
        if self.time_spent_delta < 0 {
            return Err(AppError::BadRequest(
                "Time spent cannot be negative".to_string(),
            ));
        }
        if self.current_page == Some(0) {
            return Err(AppError::BadRequest("Pages are numbered from 1".to_string()));
        }
        if self.total_pages == Some(0) {
            return Err(AppError::BadRequest("Total pages must be positive".to_string()));
        }
        if let (Some(page), Some(total)) = (self.current_page, self.total_pages) {
            if page > total {
                return Err(AppError::BadRequest(format!(
                    "Page {} is beyond the last page ({})",
                    page, total
                )));
            }
        }

        Ok(ProgressTick {
            location: self.current_location,
            percentage: self.percentage,
            current_page: self.current_page,
            total_pages: self.total_pages,
            time_spent_delta: self.time_spent_delta as u64,
        })
    }
}

/// Records and reads reading progress.
///
/// The percentage is authoritative. Page numbers are stored as reported and
/// never used to derive it.
pub struct ProgressTracker<'a> {
    repo: ProgressRepository<'a>,
    log: SyncRepository<'a>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self {
            repo: ProgressRepository::new(pool),
            log: SyncRepository::new(pool),
        }
    }

    /// Validate and store a progress tick, then log it for sync
    pub async fn record_progress(
        &self,
        user_id: &str,
        book_id: &str,
        update: ProgressUpdate,
    ) -> Result<ReadingProgress> {
        let tick = update.into_tick()?;
        let progress = self.repo.record(user_id, book_id, &tick).await?;
        self.log
            .record_server_change(
                user_id,
                OperationType::Update,
                EntityType::Progress,
                book_id,
                Some(serde_json::to_value(&progress)?),
            )
            .await?;
        tracing::debug!(
            "Progress for {}/{}: {:.1}% (+{}s)",
            user_id,
            book_id,
            progress.percentage,
            tick.time_spent_delta
        );
        Ok(progress)
    }

    /// Stored progress, or zero progress for a book never opened
    pub async fn get_progress(&self, user_id: &str, book_id: &str) -> Result<ReadingProgress> {
        Ok(self
            .repo
            .get(user_id, book_id)
            .await?
            .unwrap_or_else(|| ReadingProgress::empty(user_id, book_id)))
    }

    pub async fn list_progress(&self, user_id: &str) -> Result<Vec<ReadingProgress>> {
        self.repo.list(user_id).await
    }

    /// Books with some progress, most recently read first
    pub async fn recent(&self, user_id: &str, limit: Option<u32>) -> Result<Vec<ReadingProgress>> {
        let limit = limit.unwrap_or(DEFAULT_RECENT_LIMIT).clamp(1, 100);
        self.repo.recent(user_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn update(location: &str, percentage: f64, delta: i64) -> ProgressUpdate {
        ProgressUpdate {
            current_location: location.to_string(),
            percentage,
            current_page: None,
            total_pages: None,
            time_spent_delta: delta,
        }
    }

    #[tokio::test]
    async fn test_out_of_range_percentage_rejected() {
        let pool = test_pool().await;
        let tracker = ProgressTracker::new(&pool);

        for bad in [-0.1, 100.01, 250.0, f64::NAN, f64::INFINITY] {
            let err = tracker
                .record_progress("user-1", "book-1", update("loc", bad, 0))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "accepted {}", bad);
        }

        // Nothing was written
        let progress = tracker.get_progress("user-1", "book-1").await.unwrap();
        assert!(progress.id.is_none());
    }

    #[tokio::test]
    async fn test_negative_time_rejected() {
        let pool = test_pool().await;
        let tracker = ProgressTracker::new(&pool);

        let err = tracker
            .record_progress("user-1", "book-1", update("loc", 10.0, -5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_unknown_progress_defaults_to_zero() {
        let pool = test_pool().await;
        let tracker = ProgressTracker::new(&pool);

        let progress = tracker.get_progress("nobody", "nothing").await.unwrap();
        assert_eq!(progress.percentage, 0.0);
        assert_eq!(progress.current_location, "");
        assert_eq!(progress.time_spent, 0);
    }

    #[tokio::test]
    async fn test_record_then_get() {
        let pool = test_pool().await;
        let tracker = ProgressTracker::new(&pool);

        tracker
            .record_progress("user-1", "book-1", update("epubcfi(/6/8!/4/2/1:0)", 42.5, 60))
            .await
            .unwrap();
        tracker
            .record_progress("user-1", "book-1", update("epubcfi(/6/10!/4/2/1:0)", 47.0, 30))
            .await
            .unwrap();

        let progress = tracker.get_progress("user-1", "book-1").await.unwrap();
        assert_eq!(progress.current_location, "epubcfi(/6/10!/4/2/1:0)");
        assert_eq!(progress.percentage, 47.0);
        assert_eq!(progress.time_spent, 90);
    }

    #[tokio::test]
    async fn test_recorded_tick_is_logged_for_sync() {
        let pool = test_pool().await;
        let tracker = ProgressTracker::new(&pool);

        tracker
            .record_progress("user-1", "book-1", update("ch1", 10.0, 30))
            .await
            .unwrap();
        let stored = tracker
            .record_progress("user-1", "book-1", update("ch2", 42.0, 30))
            .await
            .unwrap();

        let ops = SyncRepository::new(&pool)
            .get_operations_since("user-1", 0, "tablet", 10)
            .await
            .unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].entity_id, "book-1");
        let logged: ReadingProgress =
            serde_json::from_value(ops[0].payload.clone().unwrap()).unwrap();
        assert_eq!(logged, stored);
    }

    #[test]
    fn test_page_beyond_total_rejected() {
        let mut bad = update("loc", 10.0, 0);
        bad.current_page = Some(12);
        bad.total_pages = Some(10);
        assert!(bad.into_tick().is_err());

        let mut ok = update("loc", 10.0, 0);
        ok.current_page = Some(10);
        ok.total_pages = Some(10);
        assert!(ok.into_tick().is_ok());
    }

    #[test]
    fn test_malformed_location_is_opaque() {
        let tick = update("not a locator {{", 5.0, 0).into_tick().unwrap();
        assert_eq!(tick.location, "not a locator {{");
    }
}
