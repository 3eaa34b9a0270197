//! Per-reader statistics derived from progress records and sessions

use std::collections::{BTreeSet, HashMap};

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::db::{ReadingProgress, ReadingSession};
use crate::library::format_reading_time;

/// How many categories `favorite_genres` reports
pub const FAVORITE_GENRE_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingStats {
    /// Books with any recorded progress
    pub total_books: usize,
    pub books_finished: usize,
    /// Seconds
    pub total_reading_time: u64,
    pub formatted_reading_time: String,
    /// Seconds per day the reader actually read
    pub average_reading_time: u64,
    /// Most frequent categories among the books being read
    pub favorite_genres: Vec<String>,
    /// Consecutive reading days ending today or yesterday
    pub reading_streak: u32,
}

impl ReadingStats {
    /// Build stats for one reader.
    ///
    /// `categories` holds the category list of each book with progress.
    /// A day counts as a reading day when a session started or progress was
    /// recorded on it (UTC).
    pub fn compute(
        progress: &[ReadingProgress],
        sessions: &[ReadingSession],
        categories: &[Vec<String>],
        total_reading_time: u64,
        today: NaiveDate,
    ) -> Self {
        let days: BTreeSet<NaiveDate> = sessions
            .iter()
            .map(|s| s.start_time.date_naive())
            .chain(progress.iter().filter_map(|p| p.last_read_at.map(|t| t.date_naive())))
            .collect();

        let average_reading_time = if days.is_empty() {
            0
        } else {
            total_reading_time / days.len() as u64
        };

        Self {
            total_books: progress.len(),
            books_finished: progress.iter().filter(|p| p.percentage >= 100.0).count(),
            total_reading_time,
            formatted_reading_time: format_reading_time(total_reading_time),
            average_reading_time,
            favorite_genres: favorite_genres(categories),
            reading_streak: reading_streak(&days, today),
        }
    }
}

/// Categories ranked by how many books carry them; ties go alphabetically
fn favorite_genres(categories: &[Vec<String>]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for book in categories {
        let unique: BTreeSet<&str> = book.iter().map(String::as_str).collect();
        for category in unique {
            *counts.entry(category).or_default() += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(FAVORITE_GENRE_COUNT)
        .map(|(category, _)| category.to_string())
        .collect()
}

fn reading_streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    // Not having read yet today does not break the streak
    let mut day = if days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };

    let mut streak = 0;
    while days.contains(&day) {
        streak += 1;
        day = day - Duration::days(1);
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn session(day: u32) -> ReadingSession {
        ReadingSession {
            id: format!("s-{}", day),
            book_id: "book-1".to_string(),
            user_id: "user-1".to_string(),
            start_time: Utc.with_ymd_and_hms(2024, 3, day, 21, 0, 0).unwrap(),
            end_time: None,
            duration: 0,
            pages_read: 0,
            location_start: String::new(),
            location_end: None,
        }
    }

    fn progress(book: &str, percentage: f64, day: u32) -> ReadingProgress {
        ReadingProgress {
            percentage,
            last_read_at: Some(Utc.with_ymd_and_hms(2024, 3, day, 8, 0, 0).unwrap()),
            ..ReadingProgress::empty("user-1", book)
        }
    }

    #[test]
    fn test_empty_reader() {
        let stats = ReadingStats::compute(&[], &[], &[], 0, date(10));
        assert_eq!(stats.total_books, 0);
        assert_eq!(stats.average_reading_time, 0);
        assert!(stats.favorite_genres.is_empty());
        assert_eq!(stats.reading_streak, 0);
    }

    #[test]
    fn test_average_per_reading_day() {
        let progress = [progress("book-1", 100.0, 9), progress("book-2", 40.0, 10)];
        let sessions = [session(9), session(8)];
        let stats = ReadingStats::compute(&progress, &sessions, &[], 3_600, date(10));

        assert_eq!(stats.books_finished, 1);
        // Reading days: 8th, 9th, 10th
        assert_eq!(stats.average_reading_time, 1_200);
        assert_eq!(stats.formatted_reading_time, "1h 0m");
    }

    #[test]
    fn test_streak_counts_back_from_today_or_yesterday() {
        let sessions = [session(7), session(8), session(9)];
        let stats = ReadingStats::compute(&[], &sessions, &[], 0, date(10));
        assert_eq!(stats.reading_streak, 3);

        let stats = ReadingStats::compute(&[], &sessions, &[], 0, date(9));
        assert_eq!(stats.reading_streak, 3);

        // A missed day ends the streak
        let stats = ReadingStats::compute(&[], &sessions, &[], 0, date(11));
        assert_eq!(stats.reading_streak, 0);
    }

    #[test]
    fn test_favorite_genres_ranked() {
        let categories = vec![
            vec!["Fantasy".to_string(), "Classic".to_string()],
            vec!["Fantasy".to_string(), "Fantasy".to_string()],
            vec!["Science Fiction".to_string(), "Classic".to_string()],
            vec!["Poetry".to_string()],
        ];
        let stats = ReadingStats::compute(&[], &[], &categories, 0, date(1));
        assert_eq!(stats.favorite_genres, vec!["Classic", "Fantasy", "Poetry"]);
    }
}
