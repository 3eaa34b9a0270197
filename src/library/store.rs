//! Catalogue backends
//!
//! The routes talk to a [`BookStore`]; which implementation sits behind it is
//! decided once at startup from [`LibrarySource`](crate::config::LibrarySource).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::BookRepository;
use crate::error::Result;

use super::book::{Book, BookQuery, BookUpdate, NewBook};
use super::fixtures::FixtureProvider;

/// Storage contract for the book catalogue
#[async_trait]
pub trait BookStore: Send + Sync {
    /// List a user's books
    async fn list(&self, query: &BookQuery) -> Result<Vec<Book>>;

    /// Create a book and return it with its generated id
    async fn create(&self, new: NewBook) -> Result<Book>;

    async fn get(&self, id: &str) -> Result<Option<Book>>;

    /// Apply an update; `None` if the book does not exist
    async fn update(&self, id: &str, update: BookUpdate) -> Result<Option<Book>>;

    /// Delete a book and its reading data; `false` if it did not exist
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Catalogue stored in SQLite
#[derive(Clone)]
pub struct SqliteBookStore {
    pool: SqlitePool,
}

impl SqliteBookStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookStore for SqliteBookStore {
    async fn list(&self, query: &BookQuery) -> Result<Vec<Book>> {
        BookRepository::new(&self.pool).list(query).await
    }

    async fn create(&self, new: NewBook) -> Result<Book> {
        let book = Book::from_new(new);
        BookRepository::new(&self.pool).insert(&book).await?;
        tracing::info!("Created book {} ('{}') for {}", book.id, book.title, book.user_id);
        Ok(book)
    }

    async fn get(&self, id: &str) -> Result<Option<Book>> {
        BookRepository::new(&self.pool).get(id).await
    }

    async fn update(&self, id: &str, update: BookUpdate) -> Result<Option<Book>> {
        let repo = BookRepository::new(&self.pool);
        let Some(mut book) = repo.get(id).await? else {
            return Ok(None);
        };
        update.apply(&mut book);
        if !repo.update(&book).await? {
            return Ok(None);
        }
        Ok(Some(book))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        BookRepository::new(&self.pool).delete(id).await
    }

    fn name(&self) -> &'static str {
        "database"
    }
}

/// Demo catalogue: serves fixtures and simulates writes without storing them
#[derive(Clone, Default)]
pub struct FixtureBookStore {
    fixtures: FixtureProvider,
}

impl FixtureBookStore {
    pub fn new(fixtures: FixtureProvider) -> Self {
        Self { fixtures }
    }
}

#[async_trait]
impl BookStore for FixtureBookStore {
    async fn list(&self, query: &BookQuery) -> Result<Vec<Book>> {
        Ok(query.apply(self.fixtures.books_for(&query.user_id)))
    }

    async fn create(&self, new: NewBook) -> Result<Book> {
        let mut book = Book::from_new(new);
        // Demo ids follow the creation clock
        book.id = Utc::now().timestamp_millis().to_string();
        tracing::debug!("Simulated creation of book {}", book.id);
        Ok(book)
    }

    async fn get(&self, id: &str) -> Result<Option<Book>> {
        Ok(Some(self.fixtures.sample_book(id)))
    }

    async fn update(&self, id: &str, update: BookUpdate) -> Result<Option<Book>> {
        let mut book = self.fixtures.sample_book(id);
        update.apply(&mut book);
        Ok(Some(book))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        tracing::debug!("Simulated deletion of book {}", id);
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "fixtures"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{Annotation, AnnotationRepository};
    use crate::db::{test_pool, ProgressRepository, ProgressTick, SessionRepository};
    use crate::library::CreateBookRequest;
    use crate::sync::{EntityType, OperationType, SyncRepository};

    fn new_book(user: &str) -> NewBook {
        CreateBookRequest {
            user_id: Some(user.to_string()),
            title: Some("Middlemarch".to_string()),
            author: Some("George Eliot".to_string()),
            file_url: Some("https://files.example.com/middlemarch.pdf".to_string()),
            file_size: Some(9000),
            file_type: Some("pdf".to_string()),
            ..Default::default()
        }
        .into_new_book(u64::MAX)
        .unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_store_crud() {
        let store = SqliteBookStore::new(test_pool().await);

        let book = store.create(new_book("user-1")).await.unwrap();
        let fetched = store.get(&book.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Middlemarch");
        assert_eq!(fetched.author, "George Eliot");

        let updated = store
            .update(
                &book.id,
                BookUpdate {
                    publisher: Some("Blackwood".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.publisher.as_deref(), Some("Blackwood"));

        assert!(store.delete(&book.id).await.unwrap());
        assert!(store.get(&book.id).await.unwrap().is_none());
        assert!(store.update(&book.id, BookUpdate::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_delete_cascades_reading_data() {
        let pool = test_pool().await;
        let store = SqliteBookStore::new(pool.clone());
        let book = store.create(new_book("user-1")).await.unwrap();

        let progress = ProgressRepository::new(&pool);
        progress
            .record(
                "user-1",
                &book.id,
                &ProgressTick {
                    location: "p1".to_string(),
                    percentage: 10.0,
                    current_page: None,
                    total_pages: None,
                    time_spent_delta: 5,
                },
            )
            .await
            .unwrap();

        let annotations = AnnotationRepository::new(&pool);
        let bookmark = Annotation::new_bookmark("user-1", &book.id, "p4", Some(4), "Dorothea", None);
        annotations.insert(&bookmark).await.unwrap();

        let sessions = SessionRepository::new(&pool);
        let session = sessions.start("user-1", &book.id, "p1").await.unwrap();

        let listed = store.list(&BookQuery::for_user("user-1")).await.unwrap();
        assert_eq!(listed[0].reading_progress, Some(10.0));

        store.delete(&book.id).await.unwrap();
        assert!(progress.get("user-1", &book.id).await.unwrap().is_none());
        assert!(annotations.get(&bookmark.id).await.unwrap().is_none());
        assert!(sessions.get(&session.id).await.unwrap().is_none());

        let logged = SyncRepository::new(&pool)
            .get_operations_since("user-1", 0, "phone", 100)
            .await
            .unwrap();
        assert_eq!(logged.len(), 2);
        assert!(logged.iter().all(|op| op.operation_type == OperationType::Delete));
        assert!(logged
            .iter()
            .any(|op| op.entity_type == EntityType::Progress && op.entity_id == book.id));
        assert!(logged
            .iter()
            .any(|op| op.entity_type == EntityType::Annotation && op.entity_id == bookmark.id));
    }

    #[tokio::test]
    async fn test_fixture_store_simulates_writes() {
        let store = FixtureBookStore::default();

        let listed = store.list(&BookQuery::for_user("demo")).await.unwrap();
        assert_eq!(listed.len(), 3);

        let created = store.create(new_book("demo")).await.unwrap();
        assert_eq!(created.title, "Middlemarch");

        assert!(store.delete("anything").await.unwrap());
        let fetched = store.get("anything").await.unwrap().unwrap();
        assert_eq!(fetched.id, "anything");
    }
}
