//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

// Timestamps are written by the application as fixed-width RFC 3339 text,
// so no column relies on SQLite's datetime() defaults.
const SCHEMA_SQL: &str = r#"
-- Book catalogue
CREATE TABLE IF NOT EXISTS books (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    description TEXT,
    cover_url TEXT,
    file_url TEXT NOT NULL,
    file_size INTEGER NOT NULL CHECK (file_size > 0),
    file_type TEXT NOT NULL CHECK (file_type IN ('epub', 'pdf', 'mobi')),
    language TEXT NOT NULL DEFAULT 'en',
    isbn TEXT,
    publisher TEXT,
    published_date TEXT,
    page_count INTEGER,
    -- Ordered JSON arrays
    categories_json TEXT NOT NULL DEFAULT '[]',
    tags_json TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_books_user_id ON books(user_id);
CREATE INDEX IF NOT EXISTS idx_books_created_at ON books(created_at);

-- Reading progress, one row per reader and book
CREATE TABLE IF NOT EXISTS reading_progress (
    id TEXT PRIMARY KEY,
    book_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    current_location TEXT NOT NULL DEFAULT '',
    current_page INTEGER,
    total_pages INTEGER,
    percentage REAL NOT NULL DEFAULT 0 CHECK (percentage >= 0 AND percentage <= 100),
    time_spent INTEGER NOT NULL DEFAULT 0 CHECK (time_spent >= 0),
    last_read_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE(user_id, book_id)
);

CREATE INDEX IF NOT EXISTS idx_progress_book_id ON reading_progress(book_id);
CREATE INDEX IF NOT EXISTS idx_progress_last_read ON reading_progress(last_read_at);

-- Bookmarks, highlights and notes
CREATE TABLE IF NOT EXISTS annotations (
    id TEXT PRIMARY KEY,
    book_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    annotation_type TEXT NOT NULL,
    location TEXT NOT NULL,
    page INTEGER,
    content_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_annotations_owner ON annotations(user_id, book_id);
CREATE INDEX IF NOT EXISTS idx_annotations_type ON annotations(annotation_type);

-- Reading sessions
CREATE TABLE IF NOT EXISTS reading_sessions (
    id TEXT PRIMARY KEY,
    book_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT,
    duration INTEGER NOT NULL DEFAULT 0 CHECK (duration >= 0),
    pages_read INTEGER NOT NULL DEFAULT 0 CHECK (pages_read >= 0),
    location_start TEXT NOT NULL,
    location_end TEXT
);

CREATE INDEX IF NOT EXISTS idx_sessions_owner ON reading_sessions(user_id, book_id);
CREATE INDEX IF NOT EXISTS idx_sessions_start ON reading_sessions(start_time);

-- Reader typography and mode settings
CREATE TABLE IF NOT EXISTS reader_preferences (
    user_id TEXT PRIMARY KEY,
    preferences_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Operation log for multi-device sync
CREATE TABLE IF NOT EXISTS sync_operations (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    device_id TEXT NOT NULL,
    operation_type TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    payload TEXT,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_user_seq ON sync_operations(user_id, seq);
CREATE INDEX IF NOT EXISTS idx_sync_record ON sync_operations(user_id, entity_type, entity_id);
"#;
