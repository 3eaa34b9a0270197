//! Sample catalogue used in demo mode
//!
//! These records are only ever served by [`FixtureBookStore`](super::FixtureBookStore),
//! which is selected explicitly at startup. Database failures never fall back here.

use chrono::{DateTime, TimeZone, Utc};

use super::book::{Book, FileType};

struct SampleBook {
    id: &'static str,
    title: &'static str,
    author: &'static str,
    file_url: &'static str,
    file_type: FileType,
    file_size: u64,
    last_read_at: (u32, u32, u32, u32), // day, hour, minute, second in January 2024
    reading_progress: f64,
}

const SAMPLE_BOOKS: [SampleBook; 3] = [
    SampleBook {
        id: "1",
        title: "The Great Gatsby",
        author: "F. Scott Fitzgerald",
        file_url: "https://drive.google.com/file/d/sample1/view",
        file_type: FileType::Epub,
        file_size: 1_024_000,
        last_read_at: (15, 10, 30, 0),
        reading_progress: 65.0,
    },
    SampleBook {
        id: "2",
        title: "To Kill a Mockingbird",
        author: "Harper Lee",
        file_url: "https://drive.google.com/file/d/sample2/view",
        file_type: FileType::Pdf,
        file_size: 2_048_000,
        last_read_at: (10, 14, 20, 0),
        reading_progress: 30.0,
    },
    SampleBook {
        id: "3",
        title: "1984",
        author: "George Orwell",
        file_url: "https://drive.google.com/file/d/sample3/view",
        file_type: FileType::Epub,
        file_size: 1_536_000,
        last_read_at: (20, 9, 15, 0),
        reading_progress: 85.0,
    },
];

/// Provides the fixed sample books
#[derive(Debug, Clone, Default)]
pub struct FixtureProvider;

impl FixtureProvider {
    pub fn new() -> Self {
        Self
    }

    /// The sample library, owned by `user_id`
    pub fn books_for(&self, user_id: &str) -> Vec<Book> {
        SAMPLE_BOOKS
            .iter()
            .map(|sample| {
                let (day, hour, minute, second) = sample.last_read_at;
                let last_read = january_2024(day, hour, minute, second);
                Book {
                    id: sample.id.to_string(),
                    user_id: user_id.to_string(),
                    title: sample.title.to_string(),
                    author: sample.author.to_string(),
                    description: None,
                    cover_url: None,
                    file_url: sample.file_url.to_string(),
                    file_size: sample.file_size,
                    file_type: sample.file_type,
                    language: "en".to_string(),
                    isbn: None,
                    publisher: None,
                    published_date: None,
                    page_count: None,
                    categories: Vec::new(),
                    tags: Vec::new(),
                    created_at: january_2024(1, 0, 0, 0),
                    updated_at: last_read,
                    last_read_at: Some(last_read),
                    reading_progress: Some(sample.reading_progress),
                }
            })
            .collect()
    }

    /// A generic sample book carrying the requested id
    pub fn sample_book(&self, id: &str) -> Book {
        let created = january_2024(1, 0, 0, 0);
        Book {
            id: id.to_string(),
            user_id: "demo-user".to_string(),
            title: "Sample Book".to_string(),
            author: "Sample Author".to_string(),
            description: None,
            cover_url: None,
            file_url: "https://drive.google.com/file/d/sample/view".to_string(),
            file_size: 1_024_000,
            file_type: FileType::Epub,
            language: "en".to_string(),
            isbn: None,
            publisher: None,
            published_date: None,
            page_count: None,
            categories: Vec::new(),
            tags: Vec::new(),
            created_at: created,
            updated_at: created,
            last_read_at: None,
            reading_progress: None,
        }
    }
}

fn january_2024(day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, minute, second)
        .single()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_library() {
        let books = FixtureProvider::new().books_for("reader-7");
        assert_eq!(books.len(), 3);
        assert!(books.iter().all(|b| b.user_id == "reader-7"));
        assert_eq!(books[0].title, "The Great Gatsby");
        assert_eq!(books[1].file_type, FileType::Pdf);
        assert_eq!(books[2].reading_progress, Some(85.0));
    }

    #[test]
    fn test_sample_book_keeps_id() {
        let book = FixtureProvider::new().sample_book("abc");
        assert_eq!(book.id, "abc");
        assert_eq!(book.title, "Sample Book");
    }
}
