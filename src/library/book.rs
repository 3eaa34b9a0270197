//! Book types and structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::db::now;
use crate::error::{AppError, Result};

use super::format::format_file_size;

/// Message returned when any required book field is missing
pub const MISSING_BOOK_FIELDS: &str =
    "Missing required fields: userId, title, author, fileUrl, fileSize, fileType";

/// Message returned for an unsupported file type
pub const UNSUPPORTED_FILE_TYPE: &str = "Only EPUB, PDF, and MOBI files are supported";

/// A book in a user's library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    pub file_url: String,
    /// File size in bytes
    pub file_size: u64,
    pub file_type: FileType,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the owner last read this book, if ever
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_read_at: Option<DateTime<Utc>>,
    /// Owner's reading percentage, if any progress exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_progress: Option<f64>,
}

impl Book {
    /// Build a book from validated input with a fresh id
    pub fn from_new(new: NewBook) -> Self {
        let now = now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            title: new.title,
            author: new.author,
            description: new.description,
            cover_url: new.cover_url,
            file_url: new.file_url,
            file_size: new.file_size,
            file_type: new.file_type,
            language: new.language,
            isbn: new.isbn,
            publisher: new.publisher,
            published_date: new.published_date,
            page_count: new.page_count,
            categories: new.categories,
            tags: new.tags,
            created_at: now,
            updated_at: now,
            last_read_at: None,
            reading_progress: None,
        }
    }

    /// Check that a page number falls inside this book.
    ///
    /// Pages are 1-based; the upper bound only applies when the book
    /// declares a page count.
    pub fn contains_page(&self, page: u32) -> bool {
        page >= 1 && self.page_count.map_or(true, |count| page <= count)
    }
}

/// Supported ebook formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Epub,
    Pdf,
    Mobi,
}

impl FileType {
    /// Parse from the short type name (`epub`, `pdf`, `mobi`)
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "epub" => Some(FileType::Epub),
            "pdf" => Some(FileType::Pdf),
            "mobi" => Some(FileType::Mobi),
            _ => None,
        }
    }

    /// Resolve a MIME type to a format
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.trim().to_lowercase().as_str() {
            "application/epub+zip" => Some(FileType::Epub),
            "application/pdf" => Some(FileType::Pdf),
            "application/x-mobipocket-ebook" => Some(FileType::Mobi),
            _ => None,
        }
    }

    /// Get MIME type for this format
    pub fn mime_type(&self) -> &'static str {
        match self {
            FileType::Epub => "application/epub+zip",
            FileType::Pdf => "application/pdf",
            FileType::Mobi => "application/x-mobipocket-ebook",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Epub => "epub",
            FileType::Pdf => "pdf",
            FileType::Mobi => "mobi",
        }
    }
}

/// Body of `POST /api/books`.
///
/// Every field is optional at the wire level so that missing fields produce
/// one readable 400 instead of a deserialization rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookRequest {
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub file_url: Option<String>,
    pub file_size: Option<i64>,
    pub file_type: Option<String>,
    /// MIME type reported by the uploader; must agree with `file_type`
    pub mime_type: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub page_count: Option<u32>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateBookRequest {
    /// Check required fields and format rules, producing a validated book
    pub fn into_new_book(self, max_file_size: u64) -> Result<NewBook> {
        let (user_id, title, author, file_url, file_size, file_type) = match (
            non_empty(self.user_id),
            non_empty(self.title),
            non_empty(self.author),
            non_empty(self.file_url),
            self.file_size.filter(|size| *size != 0),
            non_empty(self.file_type),
        ) {
            (Some(u), Some(t), Some(a), Some(url), Some(size), Some(ft)) => (u, t, a, url, size, ft),
            _ => return Err(AppError::BadRequest(MISSING_BOOK_FIELDS.to_string())),
        };

        let file_type = FileType::parse(&file_type)
            .ok_or_else(|| AppError::BadRequest(UNSUPPORTED_FILE_TYPE.to_string()))?;

        if let Some(mime) = self.mime_type.as_deref() {
            match FileType::from_mime_type(mime) {
                Some(declared) if declared == file_type => {}
                Some(declared) => {
                    return Err(AppError::BadRequest(format!(
                        "File type '{}' does not match declared MIME type '{}' ({})",
                        file_type.as_str(),
                        mime,
                        declared.as_str()
                    )))
                }
                None => return Err(AppError::BadRequest(UNSUPPORTED_FILE_TYPE.to_string())),
            }
        }

        if file_size < 0 {
            return Err(AppError::BadRequest("File size must be positive".to_string()));
        }
        let file_size = file_size as u64;
        if file_size > max_file_size {
            return Err(AppError::BadRequest(format!(
                "File size must be less than {}",
                format_file_size(max_file_size)
            )));
        }

        let new = NewBook {
            user_id,
            title,
            author,
            file_url,
            file_size,
            file_type,
            language: non_empty(self.language).unwrap_or_else(|| "en".to_string()),
            description: self.description,
            cover_url: non_empty(self.cover_url),
            isbn: self.isbn,
            publisher: self.publisher,
            published_date: self.published_date,
            page_count: self.page_count,
            categories: self.categories,
            tags: self.tags,
        };
        new.validate()?;
        Ok(new)
    }
}

/// Validated input for a new book
#[derive(Debug, Clone, Validate)]
pub struct NewBook {
    pub user_id: String,
    #[validate(length(min = 1, max = 500))]
    pub title: String,
    #[validate(length(min = 1, max = 500))]
    pub author: String,
    #[validate(url, custom = "validate_http_url")]
    pub file_url: String,
    pub file_size: u64,
    pub file_type: FileType,
    #[validate(length(min = 2, max = 35))]
    pub language: String,
    pub description: Option<String>,
    #[validate(url, custom = "validate_http_url")]
    pub cover_url: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    #[validate(range(min = 1))]
    pub page_count: Option<u32>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

/// Body of `PUT /api/books/:id`; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BookUpdate {
    #[validate(length(min = 1, max = 500))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 500))]
    pub author: Option<String>,
    pub description: Option<String>,
    #[validate(url, custom = "validate_http_url")]
    pub cover_url: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    #[validate(range(min = 1))]
    pub page_count: Option<u32>,
    pub categories: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

impl BookUpdate {
    /// Apply the present fields and bump `updated_at`
    pub fn apply(self, book: &mut Book) {
        if let Some(title) = self.title {
            book.title = title;
        }
        if let Some(author) = self.author {
            book.author = author;
        }
        if self.description.is_some() {
            book.description = self.description;
        }
        if self.cover_url.is_some() {
            book.cover_url = self.cover_url;
        }
        if self.isbn.is_some() {
            book.isbn = self.isbn;
        }
        if self.publisher.is_some() {
            book.publisher = self.publisher;
        }
        if self.published_date.is_some() {
            book.published_date = self.published_date;
        }
        if self.page_count.is_some() {
            book.page_count = self.page_count;
        }
        if let Some(categories) = self.categories {
            book.categories = categories;
        }
        if let Some(tags) = self.tags {
            book.tags = tags;
        }
        book.updated_at = now();
    }
}

/// Sort keys accepted by the book list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Title,
    Author,
    #[default]
    Date,
    Size,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Default and maximum page sizes for book listings
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Filters for listing a user's books.
///
/// List filters match any of their values, case-insensitively; the date
/// bounds are inclusive and apply to `created_at`.
#[derive(Debug, Clone)]
pub struct BookQuery {
    pub user_id: String,
    /// Substring of the title, author or description
    pub search: Option<String>,
    pub categories: Vec<String>,
    pub authors: Vec<String>,
    pub file_types: Vec<FileType>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub limit: u32,
    pub offset: u32,
}

impl BookQuery {
    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            search: None,
            categories: Vec::new(),
            authors: Vec::new(),
            file_types: Vec::new(),
            created_from: None,
            created_to: None,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }

    /// Whether a book passes every filter
    pub fn matches(&self, book: &Book) -> bool {
        if let Some(search) = self.search.as_deref() {
            let needle = search.to_lowercase();
            let found = book.title.to_lowercase().contains(&needle)
                || book.author.to_lowercase().contains(&needle)
                || book
                    .description
                    .as_deref()
                    .map_or(false, |d| d.to_lowercase().contains(&needle));
            if !found {
                return false;
            }
        }
        if !self.categories.is_empty()
            && !book
                .categories
                .iter()
                .any(|c| self.categories.iter().any(|f| f.eq_ignore_ascii_case(c)))
        {
            return false;
        }
        if !self.authors.is_empty()
            && !self.authors.iter().any(|a| a.eq_ignore_ascii_case(&book.author))
        {
            return false;
        }
        if !self.file_types.is_empty() && !self.file_types.contains(&book.file_type) {
            return false;
        }
        if self.created_from.map_or(false, |from| book.created_at < from) {
            return false;
        }
        if self.created_to.map_or(false, |to| book.created_at > to) {
            return false;
        }
        true
    }

    /// Filter, sort and page an in-memory list the same way the SQL listing does
    pub fn apply(&self, mut books: Vec<Book>) -> Vec<Book> {
        books.retain(|book| self.matches(book));
        books.sort_by(|a, b| {
            let ord = match self.sort_by {
                SortBy::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
                SortBy::Author => a.author.to_lowercase().cmp(&b.author.to_lowercase()),
                SortBy::Date => a.created_at.cmp(&b.created_at),
                SortBy::Size => a.file_size.cmp(&b.file_size),
            };
            match self.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        books
            .into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect()
    }
}

/// Book files and covers are fetched by readers, so only web URLs are accepted
fn validate_http_url(url: &str) -> std::result::Result<(), ValidationError> {
    let scheme = url.split_once("://").map(|(scheme, _)| scheme.to_ascii_lowercase());
    match scheme.as_deref() {
        Some("http") | Some("https") => Ok(()),
        _ => {
            let mut error = ValidationError::new("http_url");
            error.message = Some("URL must use http or https".into());
            Err(error)
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CreateBookRequest {
        CreateBookRequest {
            user_id: Some("user-1".to_string()),
            title: Some("Dune".to_string()),
            author: Some("Frank Herbert".to_string()),
            file_url: Some("https://files.example.com/dune.epub".to_string()),
            file_size: Some(2_048_000),
            file_type: Some("epub".to_string()),
            categories: vec!["Science Fiction".to_string(), "Classic".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_request_builds_book() {
        let new = valid_request().into_new_book(100 * 1024 * 1024).unwrap();
        assert_eq!(new.file_type, FileType::Epub);
        assert_eq!(new.language, "en");

        let book = Book::from_new(new);
        assert_eq!(book.categories, vec!["Science Fiction", "Classic"]);
        assert!(!book.id.is_empty());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut req = valid_request();
        req.author = None;
        let err = req.into_new_book(u64::MAX).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == MISSING_BOOK_FIELDS));

        let mut req = valid_request();
        req.title = Some("   ".to_string());
        assert!(req.into_new_book(u64::MAX).is_err());
    }

    #[test]
    fn test_unsupported_type_rejected() {
        let mut req = valid_request();
        req.file_type = Some("docx".to_string());
        let err = req.into_new_book(u64::MAX).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == UNSUPPORTED_FILE_TYPE));
    }

    #[test]
    fn test_mime_must_match_type() {
        let mut req = valid_request();
        req.mime_type = Some("application/pdf".to_string());
        assert!(req.into_new_book(u64::MAX).is_err());

        let mut req = valid_request();
        req.mime_type = Some("application/epub+zip".to_string());
        assert!(req.into_new_book(u64::MAX).is_ok());
    }

    #[test]
    fn test_size_bounds() {
        let mut req = valid_request();
        req.file_size = Some(-5);
        assert!(req.into_new_book(u64::MAX).is_err());

        let mut req = valid_request();
        req.file_size = Some(101 * 1024 * 1024);
        let err = req.into_new_book(100 * 1024 * 1024).unwrap_err();
        assert!(err.to_string().contains("100 MB"));
    }

    #[test]
    fn test_file_url_must_be_url() {
        let mut req = valid_request();
        req.file_url = Some("not a url".to_string());
        assert!(matches!(
            req.into_new_book(u64::MAX),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_urls_must_be_http() {
        let mut req = valid_request();
        req.file_url = Some("ftp://files.example.com/dune.epub".to_string());
        assert!(matches!(
            req.into_new_book(u64::MAX),
            Err(AppError::Validation(_))
        ));

        let mut req = valid_request();
        req.cover_url = Some("file:///covers/dune.jpg".to_string());
        assert!(req.into_new_book(u64::MAX).is_err());

        let mut req = valid_request();
        req.file_url = Some("HTTP://files.example.com/dune.epub".to_string());
        assert!(req.into_new_book(u64::MAX).is_ok());

        let update = BookUpdate {
            cover_url: Some("ftp://covers.example.com/dune.jpg".to_string()),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_page_range() {
        let mut book = Book::from_new(valid_request().into_new_book(u64::MAX).unwrap());
        assert!(!book.contains_page(0));
        assert!(book.contains_page(5000));

        book.page_count = Some(300);
        assert!(book.contains_page(300));
        assert!(!book.contains_page(301));
    }

    #[test]
    fn test_update_applies_present_fields_only() {
        let mut book = Book::from_new(valid_request().into_new_book(u64::MAX).unwrap());
        let before = book.updated_at;
        BookUpdate {
            title: Some("Dune Messiah".to_string()),
            tags: Some(vec!["sequel".to_string()]),
            ..Default::default()
        }
        .apply(&mut book);

        assert_eq!(book.title, "Dune Messiah");
        assert_eq!(book.author, "Frank Herbert");
        assert_eq!(book.tags, vec!["sequel"]);
        assert!(book.updated_at >= before);
    }

    #[test]
    fn test_query_sorting_and_paging() {
        let base = Book::from_new(valid_request().into_new_book(u64::MAX).unwrap());
        let books: Vec<Book> = ["b", "c", "a"]
            .iter()
            .enumerate()
            .map(|(i, t)| Book {
                id: i.to_string(),
                title: t.to_string(),
                file_size: (i as u64 + 1) * 10,
                ..base.clone()
            })
            .collect();

        let mut query = BookQuery::for_user("user-1");
        query.sort_by = SortBy::Title;
        query.sort_order = SortOrder::Asc;
        let titles: Vec<String> = query.apply(books.clone()).into_iter().map(|b| b.title).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);

        query.sort_by = SortBy::Size;
        query.sort_order = SortOrder::Desc;
        query.limit = 1;
        let first = query.apply(books);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].title, "a");
    }

    #[test]
    fn test_query_filters() {
        let base = Book {
            id: "1".to_string(),
            ..Book::from_new(valid_request().into_new_book(u64::MAX).unwrap())
        };
        let messiah = Book {
            id: "2".to_string(),
            title: "Dune Messiah".to_string(),
            file_type: FileType::Pdf,
            categories: vec!["Sequel".to_string()],
            created_at: base.created_at + chrono::Duration::days(10),
            ..base.clone()
        };
        let foundation = Book {
            id: "3".to_string(),
            title: "Foundation".to_string(),
            author: "Isaac Asimov".to_string(),
            description: Some("The fall of a galactic empire".to_string()),
            categories: vec!["Science Fiction".to_string()],
            ..base.clone()
        };
        let created = base.created_at;
        let books = vec![base, messiah, foundation];
        let ids = |query: &BookQuery| -> Vec<String> {
            let mut ids: Vec<String> = query.apply(books.clone()).into_iter().map(|b| b.id).collect();
            ids.sort();
            ids
        };

        let mut query = BookQuery::for_user("user-1");
        query.search = Some("GALACTIC".to_string());
        assert_eq!(ids(&query), vec!["3"]);

        let mut query = BookQuery::for_user("user-1");
        query.categories = vec!["classic".to_string(), "sequel".to_string()];
        assert_eq!(ids(&query), vec!["1", "2"]);

        let mut query = BookQuery::for_user("user-1");
        query.authors = vec!["frank herbert".to_string()];
        query.file_types = vec![FileType::Pdf];
        assert_eq!(ids(&query), vec!["2"]);

        let mut query = BookQuery::for_user("user-1");
        query.created_from = Some(created + chrono::Duration::days(1));
        assert_eq!(ids(&query), vec!["2"]);
        query.created_from = None;
        query.created_to = Some(created);
        assert_eq!(ids(&query), vec!["1", "3"]);
    }
}
