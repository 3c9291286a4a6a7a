//! Content-based scoring
//!
//! Scores candidate books by the Jaccard overlap between a reader's declared
//! interests and each book's genres. This stage only scores; ranking and
//! filtering belong to the hybrid ranker.

use rayon::prelude::*;

use super::genres::{jaccard, GenreSet};
use super::model::{Book, Explanation, ScoreSource, ScoredBook};

/// Below this many candidates rayon's scheduling overhead is not worth it
const PARALLEL_THRESHOLD: usize = 256;

/// Score every candidate against `user_interests`.
///
/// Zero scores are kept. An empty interest set scores every book 0, which
/// the orchestrator reads as "no content opinion". Output order matches
/// `candidate_books`.
pub fn score_by_content(user_interests: &GenreSet, candidate_books: &[Book]) -> Vec<ScoredBook> {
    if candidate_books.len() < PARALLEL_THRESHOLD {
        candidate_books
            .iter()
            .map(|book| score_book(user_interests, book))
            .collect()
    } else {
        candidate_books
            .par_iter()
            .map(|book| score_book(user_interests, book))
            .collect()
    }
}

fn score_book(user_interests: &GenreSet, book: &Book) -> ScoredBook {
    let score = jaccard(user_interests, &book.genres);
    let matching_genres = user_interests
        .intersection(&book.genres)
        .map(str::to_string)
        .collect();

    ScoredBook {
        book_id: book.id,
        score,
        source: ScoreSource::Content,
        explanation: Explanation {
            content_score: score,
            matching_genres,
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interests(genres: &[&str]) -> GenreSet {
        genres.iter().collect()
    }

    #[test]
    fn test_scores_by_genre_overlap() {
        let books = vec![
            Book::new(1, "B1", "A", ["Fantasy", "Mystery"]),
            Book::new(2, "B2", "A", ["Romance"]),
            Book::new(3, "B3", "A", ["Fantasy", "Adventure"]),
        ];
        let scored = score_by_content(&interests(&["fantasy", "mystery"]), &books);

        assert_eq!(scored.len(), 3);
        assert_eq!(scored[0].score, 1.0);
        assert_eq!(scored[1].score, 0.0);
        assert!((scored[2].score - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(scored[0].explanation.matching_genres, vec!["fantasy", "mystery"]);
        assert!(scored.iter().all(|s| s.source == ScoreSource::Content));
    }

    #[test]
    fn test_empty_interests_score_zero_everywhere() {
        let books = vec![
            Book::new(1, "B1", "A", ["Fantasy"]),
            Book::new(2, "B2", "A", Vec::<String>::new()),
        ];
        let scored = score_by_content(&GenreSet::new(), &books);
        assert_eq!(scored.len(), 2);
        assert!(scored.iter().all(|s| s.score == 0.0));
    }

    #[test]
    fn test_book_without_genres_scores_zero() {
        let books = vec![Book::new(7, "Untagged", "A", Vec::<String>::new())];
        let scored = score_by_content(&interests(&["poetry"]), &books);
        assert_eq!(scored[0].score, 0.0);
        assert!(scored[0].explanation.matching_genres.is_empty());
    }

    #[test]
    fn test_parallel_path_preserves_order() {
        let books: Vec<Book> = (0..1000)
            .map(|i| {
                let genre = if i % 2 == 0 { "history" } else { "science" };
                Book::new(i, "T", "A", [genre])
            })
            .collect();
        let scored = score_by_content(&interests(&["history"]), &books);
        assert_eq!(scored.len(), 1000);
        for (i, s) in scored.iter().enumerate() {
            assert_eq!(s.book_id, i as i64);
            assert_eq!(s.score, if i % 2 == 0 { 1.0 } else { 0.0 });
        }
    }
}
