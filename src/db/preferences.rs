//! Reader preference storage

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use validator::Validate;

use crate::error::Result;

use super::{now, to_db_time};

/// Colour scheme of the reading view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    Sepia,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingMode {
    Scroll,
    Pagination,
}

/// Typography and reading behaviour for one reader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReaderPreferences {
    pub theme: Theme,
    #[validate(range(min = 12, max = 32))]
    pub font_size: u32,
    #[validate(length(min = 1, max = 100))]
    pub font_family: String,
    #[validate(range(min = 1.2, max = 2.5))]
    pub line_height: f64,
    #[validate(range(min = 0, max = 100))]
    pub margin: u32,
    pub reading_mode: ReadingMode,
    pub auto_save_progress: bool,
    pub sync_across_devices: bool,
    /// Missing in preferences saved before notifications existed
    #[serde(default)]
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub reading_reminders: bool,
    pub new_books: bool,
    pub progress_updates: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            reading_reminders: true,
            new_books: true,
            progress_updates: true,
        }
    }
}

impl Default for ReaderPreferences {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            font_size: 16,
            font_family: "Georgia, serif".to_string(),
            line_height: 1.6,
            margin: 20,
            reading_mode: ReadingMode::Scroll,
            auto_save_progress: true,
            sync_across_devices: true,
            notifications: NotificationSettings::default(),
        }
    }
}

/// Preference repository
pub struct PreferencesRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PreferencesRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Stored preferences, if the reader ever saved any
    pub async fn get(&self, user_id: &str) -> Result<Option<ReaderPreferences>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT preferences_json FROM reader_preferences WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(self.pool)
                .await?;

        Ok(row.map(|(json,)| serde_json::from_str(&json)).transpose()?)
    }

    /// Replace a reader's preferences
    pub async fn save(&self, user_id: &str, preferences: &ReaderPreferences) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reader_preferences (user_id, preferences_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                preferences_json = excluded.preferences_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(serde_json::to_string(preferences)?)
        .bind(to_db_time(now()))
        .execute(self.pool)
        .await?;

        Ok(())
    }
}
