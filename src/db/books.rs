//! Book catalogue database operations

use sqlx::SqlitePool;

use crate::error::Result;
use crate::library::{Book, BookQuery, FileType, SortBy, SortOrder};
use crate::sync::{append_operation, server_operation, EntityType, OperationType};

use super::{from_db_time, to_db_time};

const BOOK_COLUMNS: &str = r#"
    b.id, b.user_id, b.title, b.author, b.description, b.cover_url, b.file_url,
    b.file_size, b.file_type, b.language, b.isbn, b.publisher, b.published_date,
    b.page_count, b.categories_json, b.tags_json, b.created_at, b.updated_at,
    p.last_read_at AS progress_last_read, p.percentage AS progress_percentage
"#;

/// Book repository
pub struct BookRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BookRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// List a user's books with their own reading progress attached
    pub async fn list(&self, query: &BookQuery) -> Result<Vec<Book>> {
        let order_column = match query.sort_by {
            SortBy::Title => "b.title COLLATE NOCASE",
            SortBy::Author => "b.author COLLATE NOCASE",
            SortBy::Date => "b.created_at",
            SortBy::Size => "b.file_size",
        };
        let direction = match query.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        // List filters travel as JSON arrays so the statement keeps a fixed shape
        let search = query.search.as_deref().map(like_pattern);
        let categories = json_filter(&query.categories)?;
        let authors = json_filter(&query.authors)?;
        let file_types = json_filter(
            &query
                .file_types
                .iter()
                .map(FileType::as_str)
                .collect::<Vec<_>>(),
        )?;

        let sql = format!(
            r#"
            SELECT {BOOK_COLUMNS}
            FROM books b
            LEFT JOIN reading_progress p ON p.book_id = b.id AND p.user_id = b.user_id
            WHERE b.user_id = ?1
              AND (?2 IS NULL
                   OR b.title LIKE ?2 ESCAPE '\'
                   OR b.author LIKE ?2 ESCAPE '\'
                   OR b.description LIKE ?2 ESCAPE '\')
              AND (?3 IS NULL OR EXISTS (
                   SELECT 1 FROM json_each(b.categories_json) c, json_each(?3) f
                   WHERE lower(c.value) = lower(f.value)))
              AND (?4 IS NULL OR EXISTS (
                   SELECT 1 FROM json_each(?4) f WHERE lower(f.value) = lower(b.author)))
              AND (?5 IS NULL OR b.file_type IN (SELECT value FROM json_each(?5)))
              AND (?6 IS NULL OR b.created_at >= ?6)
              AND (?7 IS NULL OR b.created_at <= ?7)
            ORDER BY {order_column} {direction}, b.id ASC
            LIMIT ?8 OFFSET ?9
            "#
        );

        let rows = sqlx::query_as::<_, BookRow>(&sql)
            .bind(&query.user_id)
            .bind(search)
            .bind(categories)
            .bind(authors)
            .bind(file_types)
            .bind(query.created_from.map(to_db_time))
            .bind(query.created_to.map(to_db_time))
            .bind(query.limit as i64)
            .bind(query.offset as i64)
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(BookRow::into_book).collect()
    }

    /// Get a book by ID
    pub async fn get(&self, id: &str) -> Result<Option<Book>> {
        let sql = format!(
            r#"
            SELECT {BOOK_COLUMNS}
            FROM books b
            LEFT JOIN reading_progress p ON p.book_id = b.id AND p.user_id = b.user_id
            WHERE b.id = ?
            "#
        );

        let row = sqlx::query_as::<_, BookRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        row.map(BookRow::into_book).transpose()
    }

    /// Insert a new book
    pub async fn insert(&self, book: &Book) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO books (
                id, user_id, title, author, description, cover_url, file_url,
                file_size, file_type, language, isbn, publisher, published_date,
                page_count, categories_json, tags_json, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&book.id)
        .bind(&book.user_id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.description)
        .bind(&book.cover_url)
        .bind(&book.file_url)
        .bind(book.file_size as i64)
        .bind(book.file_type.as_str())
        .bind(&book.language)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(&book.published_date)
        .bind(book.page_count.map(i64::from))
        .bind(serde_json::to_string(&book.categories)?)
        .bind(serde_json::to_string(&book.tags)?)
        .bind(to_db_time(book.created_at))
        .bind(to_db_time(book.updated_at))
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Write the editable metadata of an existing book
    pub async fn update(&self, book: &Book) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE books SET
                title = ?, author = ?, description = ?, cover_url = ?,
                isbn = ?, publisher = ?, published_date = ?, page_count = ?,
                categories_json = ?, tags_json = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.description)
        .bind(&book.cover_url)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(&book.published_date)
        .bind(book.page_count.map(i64::from))
        .bind(serde_json::to_string(&book.categories)?)
        .bind(serde_json::to_string(&book.tags)?)
        .bind(to_db_time(book.updated_at))
        .bind(&book.id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a book together with every reading record that hangs off it.
    ///
    /// Removed progress and annotations are logged as deletes for sync in the
    /// same transaction, so devices drop their copies on the next pull.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let progress_owners: Vec<(String,)> =
            sqlx::query_as("SELECT user_id FROM reading_progress WHERE book_id = ?")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;
        let annotations: Vec<(String, String)> =
            sqlx::query_as("SELECT id, user_id FROM annotations WHERE book_id = ?")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        for table in ["reading_progress", "annotations", "reading_sessions"] {
            let removed = sqlx::query(&format!("DELETE FROM {table} WHERE book_id = ?"))
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if removed.rows_affected() > 0 {
                tracing::debug!("Removed {} {} rows for book {}", removed.rows_affected(), table, id);
            }
        }

        for (user_id,) in &progress_owners {
            let op = server_operation(OperationType::Delete, EntityType::Progress, id, None);
            append_operation(&mut tx, user_id, &op).await?;
        }
        for (annotation_id, user_id) in &annotations {
            let op = server_operation(OperationType::Delete, EntityType::Annotation, annotation_id, None);
            append_operation(&mut tx, user_id, &op).await?;
        }

        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Internal row type for SQLite queries
#[derive(sqlx::FromRow)]
struct BookRow {
    id: String,
    user_id: String,
    title: String,
    author: String,
    description: Option<String>,
    cover_url: Option<String>,
    file_url: String,
    file_size: i64,
    file_type: String,
    language: String,
    isbn: Option<String>,
    publisher: Option<String>,
    published_date: Option<String>,
    page_count: Option<i64>,
    categories_json: String,
    tags_json: String,
    created_at: String,
    updated_at: String,
    progress_last_read: Option<String>,
    progress_percentage: Option<f64>,
}

impl BookRow {
    fn into_book(self) -> Result<Book> {
        let file_type = FileType::parse(&self.file_type).ok_or_else(|| {
            crate::error::AppError::Internal(format!(
                "Stored book {} has unknown file type '{}'",
                self.id, self.file_type
            ))
        })?;

        Ok(Book {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            author: self.author,
            description: self.description,
            cover_url: self.cover_url,
            file_url: self.file_url,
            file_size: self.file_size.max(0) as u64,
            file_type,
            language: self.language,
            isbn: self.isbn,
            publisher: self.publisher,
            published_date: self.published_date,
            page_count: self.page_count.map(|p| p.max(0) as u32),
            categories: serde_json::from_str(&self.categories_json)?,
            tags: serde_json::from_str(&self.tags_json)?,
            created_at: from_db_time(&self.created_at)?,
            updated_at: from_db_time(&self.updated_at)?,
            last_read_at: self
                .progress_last_read
                .as_deref()
                .map(from_db_time)
                .transpose()?,
            reading_progress: self.progress_percentage,
        })
    }
}

/// `LIKE` pattern matching `term` anywhere, with wildcards in the term escaped
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// JSON array bound for a list filter; `None` when the filter is unused
fn json_filter<T: serde::Serialize>(values: &[T]) -> Result<Option<String>> {
    if values.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(values)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::library::{CreateBookRequest, SortBy};

    fn sample(user: &str, title: &str, size: i64) -> Book {
        let req = CreateBookRequest {
            user_id: Some(user.to_string()),
            title: Some(title.to_string()),
            author: Some("Ursula K. Le Guin".to_string()),
            file_url: Some(format!("https://files.example.com/{}.epub", title)),
            file_size: Some(size),
            file_type: Some("epub".to_string()),
            tags: vec!["fantasy".to_string(), "sea".to_string()],
            ..Default::default()
        };
        Book::from_new(req.into_new_book(u64::MAX).unwrap())
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let pool = test_pool().await;
        let repo = BookRepository::new(&pool);

        let book = sample("user-1", "Earthsea", 4096);
        repo.insert(&book).await.unwrap();

        let loaded = repo.get(&book.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Earthsea");
        assert_eq!(loaded.tags, vec!["fantasy", "sea"]);
        assert_eq!(loaded.created_at, crate::db::from_db_time(&to_db_time(book.created_at)).unwrap());
        assert!(loaded.reading_progress.is_none());
    }

    #[tokio::test]
    async fn test_list_is_scoped_and_sorted() {
        let pool = test_pool().await;
        let repo = BookRepository::new(&pool);

        repo.insert(&sample("user-1", "b-title", 300)).await.unwrap();
        repo.insert(&sample("user-1", "A-title", 100)).await.unwrap();
        repo.insert(&sample("user-2", "other", 200)).await.unwrap();

        let mut query = BookQuery::for_user("user-1");
        query.sort_by = SortBy::Title;
        query.sort_order = SortOrder::Asc;

        let books = repo.list(&query).await.unwrap();
        let titles: Vec<&str> = books.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["A-title", "b-title"]);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let pool = test_pool().await;
        let repo = BookRepository::new(&pool);

        let mut wizard = sample("user-1", "A Wizard of Earthsea", 100);
        wizard.categories = vec!["Fantasy".to_string()];
        wizard.description = Some("Ged learns 100% of true names".to_string());
        let mut dispossessed = sample("user-1", "The Dispossessed", 200);
        dispossessed.categories = vec!["Science Fiction".to_string()];
        dispossessed.file_type = FileType::Pdf;
        dispossessed.created_at = wizard.created_at + chrono::Duration::days(30);
        let mut dune = sample("user-1", "Dune", 300);
        dune.author = "Frank Herbert".to_string();
        for book in [&wizard, &dispossessed, &dune] {
            repo.insert(book).await.unwrap();
        }

        let titles = |books: Vec<Book>| -> Vec<String> {
            let mut titles: Vec<String> = books.into_iter().map(|b| b.title).collect();
            titles.sort();
            titles
        };

        let mut query = BookQuery::for_user("user-1");
        query.search = Some("earthSEA".to_string());
        assert_eq!(titles(repo.list(&query).await.unwrap()), vec!["A Wizard of Earthsea"]);

        // Wildcards in the term match literally
        query.search = Some("100%".to_string());
        assert_eq!(titles(repo.list(&query).await.unwrap()), vec!["A Wizard of Earthsea"]);
        query.search = Some("%".to_string());
        assert_eq!(repo.list(&query).await.unwrap().len(), 1);

        let mut query = BookQuery::for_user("user-1");
        query.categories = vec!["science fiction".to_string(), "poetry".to_string()];
        assert_eq!(titles(repo.list(&query).await.unwrap()), vec!["The Dispossessed"]);

        let mut query = BookQuery::for_user("user-1");
        query.authors = vec!["ursula k. le guin".to_string()];
        query.file_types = vec![FileType::Epub];
        assert_eq!(titles(repo.list(&query).await.unwrap()), vec!["A Wizard of Earthsea"]);

        let mut query = BookQuery::for_user("user-1");
        query.created_from = Some(wizard.created_at + chrono::Duration::days(1));
        assert_eq!(titles(repo.list(&query).await.unwrap()), vec!["The Dispossessed"]);
        query.created_from = None;
        query.created_to = Some(dispossessed.created_at - chrono::Duration::days(1));
        assert_eq!(repo.list(&query).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update() {
        let pool = test_pool().await;
        let repo = BookRepository::new(&pool);

        let mut book = sample("user-1", "Earthsea", 4096);
        repo.insert(&book).await.unwrap();

        book.title = "The Farthest Shore".to_string();
        book.page_count = Some(259);
        assert!(repo.update(&book).await.unwrap());

        let loaded = repo.get(&book.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "The Farthest Shore");
        assert_eq!(loaded.page_count, Some(259));
    }

    #[tokio::test]
    async fn test_delete_missing_returns_false() {
        let pool = test_pool().await;
        let repo = BookRepository::new(&pool);
        assert!(!repo.delete("nope").await.unwrap());
    }
}
