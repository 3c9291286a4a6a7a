//! Cold-start fallback
//!
//! Readers with neither interests nor neighbors still get something to
//! browse: the most-rated books first, then the newest additions. Fallback
//! entries carry fixed scores and never mix with the personalized ranking.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::model::{Book, BookId, BookPopularity};

/// Score for a book that readers have rated
pub const POPULAR_SCORE: f64 = 0.5;
/// Score for a book picked because it is new
pub const RECENT_SCORE: f64 = 0.3;

/// Why a book appears in the fallback list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    Popular,
    Recent,
}

impl FallbackReason {
    pub fn describe(&self) -> &'static str {
        match self {
            FallbackReason::Popular => "Popular among readers",
            FallbackReason::Recent => "Recently added",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackBook {
    pub book_id: BookId,
    pub score: f64,
    pub reason: FallbackReason,
    pub rating_count: usize,
    pub average_rating: Option<f64>,
}

/// Merge popular and recent books into one list of at most `limit`.
///
/// `popular` is expected most-rated first and `recent` newest first. Books
/// in `exclude` and repeats are skipped. A "popular" book nobody has rated
/// yet is reported as recent.
pub fn fallback_books(
    popular: &[BookPopularity],
    recent: &[Book],
    exclude: &HashSet<BookId>,
    limit: usize,
) -> Vec<FallbackBook> {
    let mut seen: HashSet<BookId> = HashSet::new();
    let mut picked = Vec::with_capacity(limit);

    for entry in popular {
        if picked.len() >= limit {
            return picked;
        }
        if exclude.contains(&entry.book.id) || !seen.insert(entry.book.id) {
            continue;
        }
        let reason = if entry.rating_count > 0 {
            FallbackReason::Popular
        } else {
            FallbackReason::Recent
        };
        picked.push(FallbackBook {
            book_id: entry.book.id,
            score: POPULAR_SCORE,
            reason,
            rating_count: entry.rating_count,
            average_rating: entry.average_rating,
        });
    }

    for book in recent {
        if picked.len() >= limit {
            break;
        }
        if exclude.contains(&book.id) || !seen.insert(book.id) {
            continue;
        }
        picked.push(FallbackBook {
            book_id: book.id,
            score: RECENT_SCORE,
            reason: FallbackReason::Recent,
            rating_count: 0,
            average_rating: None,
        });
    }

    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn popular(id: BookId, rating_count: usize, average_rating: Option<f64>) -> BookPopularity {
        BookPopularity {
            book: Book::new(id, "T", "A", ["fantasy"]),
            rating_count,
            average_rating,
        }
    }

    #[test]
    fn test_popular_first_then_recent_without_repeats() {
        let pop = vec![popular(1, 3, Some(4.0)), popular(2, 1, Some(5.0))];
        let recent = vec![
            Book::new(9, "New", "A", ["mystery"]),
            Book::new(1, "Old", "A", ["fantasy"]),
            Book::new(8, "Newer", "B", ["mystery"]),
        ];

        let list = fallback_books(&pop, &recent, &HashSet::new(), 4);
        let ids: Vec<BookId> = list.iter().map(|f| f.book_id).collect();
        assert_eq!(ids, vec![1, 2, 9, 8]);
        assert_eq!(list[0].reason, FallbackReason::Popular);
        assert_eq!(list[0].score, POPULAR_SCORE);
        assert_eq!(list[2].reason, FallbackReason::Recent);
        assert_eq!(list[2].score, RECENT_SCORE);
    }

    #[test]
    fn test_excluded_and_unrated_books() {
        let pop = vec![popular(1, 2, Some(3.0)), popular(2, 0, None)];
        let exclude: HashSet<BookId> = [1].into_iter().collect();

        let list = fallback_books(&pop, &[], &exclude, 10);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].book_id, 2);
        assert_eq!(list[0].reason, FallbackReason::Recent);
        assert_eq!(list[0].reason.describe(), "Recently added");
    }

    #[test]
    fn test_limit_respected() {
        let pop: Vec<BookPopularity> = (1..=5).map(|i| popular(i, 1, Some(4.0))).collect();
        assert_eq!(fallback_books(&pop, &[], &HashSet::new(), 2).len(), 2);
        assert!(fallback_books(&pop, &[], &HashSet::new(), 0).is_empty());
    }
}
