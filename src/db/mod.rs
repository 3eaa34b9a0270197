//! Database module for SQLite persistence
//!
//! Handles the book catalogue, reading progress, sessions and reader
//! preferences. Annotations and the sync log keep their repositories next to
//! their types.

mod books;
mod preferences;
mod progress;
mod schema;

pub use books::*;
pub use preferences::*;
pub use progress::*;
pub use schema::*;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::Result;

/// Create a new database connection pool
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

    // Every connection to ":memory:" is its own database, so pin a single one
    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?
    };

    // Run migrations
    initialize_schema(&pool).await?;

    Ok(pool)
}

/// Encode a timestamp for storage.
///
/// Fixed-width UTC so that stored values order correctly as text.
pub fn to_db_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a stored timestamp
pub fn from_db_time(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

/// Current time, truncated to the stored precision
pub fn now() -> DateTime<Utc> {
    // Round-trip through the storage format so in-memory and stored values agree
    let now = Utc::now();
    from_db_time(&to_db_time(now)).unwrap_or(now)
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    create_pool("sqlite::memory:", 1).await.unwrap()
}
