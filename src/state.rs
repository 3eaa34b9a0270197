//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::{Config, LibrarySource};
use crate::db;
use crate::error::Result;
use crate::library::{BookStore, FixtureBookStore, FixtureProvider, SqliteBookStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    books: Arc<dyn BookStore>,
}

impl AppState {
    pub fn new(config: Config, db: SqlitePool, books: Arc<dyn BookStore>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, db, books }),
        }
    }

    /// Open the database and pick the catalogue backend.
    ///
    /// The choice is made once here; a failing database is reported as such
    /// and never replaced by fixtures later on.
    pub async fn from_config(config: Config) -> Result<Self> {
        let pool = db::create_pool(&config.database.url, config.database.max_connections).await?;

        let books: Arc<dyn BookStore> = match config.library.source {
            LibrarySource::Database => Arc::new(SqliteBookStore::new(pool.clone())),
            LibrarySource::Fixtures => Arc::new(FixtureBookStore::new(FixtureProvider::new())),
        };
        tracing::info!("Book catalogue served from {}", books.name());

        Ok(Self::new(config, pool, books))
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the book catalogue
    pub fn books(&self) -> &dyn BookStore {
        self.inner.books.as_ref()
    }
}
