//! SQLite storage for annotations
//!
//! Provides CRUD operations for annotations using SQLite.

use sqlx::SqlitePool;

use crate::db::{from_db_time, to_db_time};
use crate::error::Result;

use super::types::{Annotation, AnnotationContent, AnnotationType};

/// Repository for annotation persistence
pub struct AnnotationRepository<'a> {
    pool: &'a SqlitePool,
}

/// Query filters for listing annotations
#[derive(Debug, Default)]
pub struct AnnotationQuery {
    pub user_id: Option<String>,
    pub book_id: Option<String>,
    pub annotation_type: Option<AnnotationType>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

const ANNOTATION_COLUMNS: &str = r#"
    id, book_id, user_id, location, page, content_json, created_at, updated_at
"#;

impl<'a> AnnotationRepository<'a> {
    /// Create a new repository
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new annotation.
    ///
    /// Locations are not unique: several annotations may share one.
    pub async fn insert(&self, annotation: &Annotation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO annotations (
                id, book_id, user_id, annotation_type, location, page,
                content_json, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&annotation.id)
        .bind(&annotation.book_id)
        .bind(&annotation.user_id)
        .bind(annotation.annotation_type().as_str())
        .bind(&annotation.location)
        .bind(annotation.page.map(i64::from))
        .bind(serde_json::to_string(&annotation.content)?)
        .bind(to_db_time(annotation.created_at))
        .bind(to_db_time(annotation.updated_at))
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Write an annotation unless the stored copy is at least as recent.
    ///
    /// A row owned by another user is never replaced. Returns `true` when the
    /// row was inserted or replaced.
    pub async fn save_if_newer(&self, annotation: &Annotation) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO annotations (
                id, book_id, user_id, annotation_type, location, page,
                content_json, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                annotation_type = excluded.annotation_type,
                location = excluded.location,
                page = excluded.page,
                content_json = excluded.content_json,
                updated_at = excluded.updated_at
            WHERE excluded.updated_at > annotations.updated_at
              AND annotations.user_id = excluded.user_id
            "#,
        )
        .bind(&annotation.id)
        .bind(&annotation.book_id)
        .bind(&annotation.user_id)
        .bind(annotation.annotation_type().as_str())
        .bind(&annotation.location)
        .bind(annotation.page.map(i64::from))
        .bind(serde_json::to_string(&annotation.content)?)
        .bind(to_db_time(annotation.created_at))
        .bind(to_db_time(annotation.updated_at))
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get an annotation by ID
    pub async fn get(&self, id: &str) -> Result<Option<Annotation>> {
        let row = sqlx::query_as::<_, AnnotationRow>(&format!(
            "SELECT {ANNOTATION_COLUMNS} FROM annotations WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| r.into_annotation()).transpose()
    }

    /// Get an annotation only if `user_id` owns it
    pub async fn get_for_user(&self, id: &str, user_id: &str) -> Result<Option<Annotation>> {
        let row = sqlx::query_as::<_, AnnotationRow>(&format!(
            "SELECT {ANNOTATION_COLUMNS} FROM annotations WHERE id = ? AND user_id = ?"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| r.into_annotation()).transpose()
    }

    /// Owner of an annotation id, if it exists
    pub async fn owner_of(&self, id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT user_id FROM annotations WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(|r| r.0))
    }

    /// List annotations with optional filters
    pub async fn list(&self, query: &AnnotationQuery) -> Result<Vec<Annotation>> {
        let mut sql = format!("SELECT {ANNOTATION_COLUMNS} FROM annotations WHERE 1=1");

        if query.user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if query.book_id.is_some() {
            sql.push_str(" AND book_id = ?");
        }
        if query.annotation_type.is_some() {
            sql.push_str(" AND annotation_type = ?");
        }

        sql.push_str(" ORDER BY created_at DESC");

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
            if let Some(offset) = query.offset {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        }

        let mut q = sqlx::query_as::<_, AnnotationRow>(&sql);

        if let Some(ref user_id) = query.user_id {
            q = q.bind(user_id);
        }
        if let Some(ref book_id) = query.book_id {
            q = q.bind(book_id);
        }
        if let Some(ann_type) = query.annotation_type {
            q = q.bind(ann_type.as_str());
        }

        let rows = q.fetch_all(self.pool).await?;

        rows.into_iter().map(|r| r.into_annotation()).collect()
    }

    /// Persist an edited annotation
    pub async fn update(&self, annotation: &Annotation) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE annotations SET content_json = ?, updated_at = ? WHERE id = ?",
        )
        .bind(serde_json::to_string(&annotation.content)?)
        .bind(to_db_time(annotation.updated_at))
        .bind(&annotation.id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete an annotation; `false` if it did not exist
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM annotations WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete an annotation owned by `user_id`; `false` if there was none
    pub async fn delete_for_user(&self, id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM annotations WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Internal row type for SQLite queries
#[derive(sqlx::FromRow)]
struct AnnotationRow {
    id: String,
    book_id: String,
    user_id: String,
    location: String,
    page: Option<i64>,
    content_json: String,
    created_at: String,
    updated_at: String,
}

impl AnnotationRow {
    fn into_annotation(self) -> Result<Annotation> {
        let content: AnnotationContent = serde_json::from_str(&self.content_json)?;

        Ok(Annotation {
            id: self.id,
            book_id: self.book_id,
            user_id: self.user_id,
            location: self.location,
            page: self.page.map(|p| p.max(0) as u32),
            content,
            created_at: from_db_time(&self.created_at)?,
            updated_at: from_db_time(&self.updated_at)?,
        })
    }
}
