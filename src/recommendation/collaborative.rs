//! Collaborative scoring
//!
//! Aggregates the high ratings of neighbor readers into per-book scores.
//! A contribution is `similarity × rating / 5`, so a close neighbor's
//! five-star rating outweighs a distant neighbor's.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

use crate::error::{Error, Result};

use super::model::{
    BookId, Endorsement, Explanation, Rating, ScoreSource, ScoredBook, UserId, UserSimilarity,
    MAX_RATING, MIN_RATING,
};

/// How contributions from several neighbors combine for one book
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Contributions add up: several endorsements beat a single strong one
    #[default]
    Sum,
    /// Average contribution: strength of taste overlap over head count
    Mean,
}

impl FromStr for Aggregation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sum" => Ok(Aggregation::Sum),
            "mean" | "avg" | "average" => Ok(Aggregation::Mean),
            other => Err(Error::invalid_input(
                "aggregation",
                format!("unknown aggregation '{}', expected sum or mean", other),
            )),
        }
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregation::Sum => write!(f, "sum"),
            Aggregation::Mean => write!(f, "mean"),
        }
    }
}

/// Validate a rating threshold; it lives on the same 1 to 5 scale as ratings
pub fn validate_rating_threshold(rating_threshold: u8) -> Result<()> {
    if (MIN_RATING..=MAX_RATING).contains(&rating_threshold) {
        Ok(())
    } else {
        Err(Error::invalid_input(
            "rating_threshold",
            format!(
                "{} is outside {}..={}",
                rating_threshold, MIN_RATING, MAX_RATING
            ),
        ))
    }
}

/// Reject any rating outside 1 to 5 instead of clamping it
pub fn validate_ratings<'a>(ratings: impl IntoIterator<Item = &'a Rating>) -> Result<()> {
    for rating in ratings {
        if !rating.is_valid() {
            return Err(Error::invalid_input(
                "rating",
                format!(
                    "user {} rated book {} with {}, expected {}..={}",
                    rating.user_id, rating.book_id, rating.score, MIN_RATING, MAX_RATING
                ),
            ));
        }
    }
    Ok(())
}

/// Score books from neighbor ratings.
///
/// Only ratings at or above `rating_threshold` count. Books in `exclude`
/// (everything the target reader has rated, at any score) are removed last.
/// When a neighbor has several ratings for the same book, the last one in
/// the sequence is authoritative.
pub fn score_by_collaboration(
    similar_users: &[UserSimilarity],
    ratings_by_similar_user: &HashMap<UserId, Vec<Rating>>,
    rating_threshold: u8,
    exclude: &HashSet<BookId>,
    aggregation: Aggregation,
) -> Result<Vec<ScoredBook>> {
    validate_rating_threshold(rating_threshold)?;

    // BTreeMap keeps output ordered by book id
    let mut by_book: BTreeMap<BookId, (f64, Vec<Endorsement>)> = BTreeMap::new();

    for neighbor in similar_users {
        let Some(ratings) = ratings_by_similar_user.get(&neighbor.user_id) else {
            continue;
        };
        validate_ratings(ratings)?;

        if neighbor.similarity <= 0.0 {
            continue;
        }

        let mut latest: HashMap<BookId, &Rating> = HashMap::with_capacity(ratings.len());
        for rating in ratings.iter().filter(|r| r.user_id == neighbor.user_id) {
            latest.insert(rating.book_id, rating);
        }

        for rating in latest.into_values() {
            if rating.score < rating_threshold {
                continue;
            }
            let entry = by_book.entry(rating.book_id).or_default();
            entry.0 += neighbor.similarity * rating.normalized();
            entry.1.push(Endorsement {
                user_id: neighbor.user_id,
                rating: rating.score,
                similarity: neighbor.similarity,
            });
        }
    }

    let scored = by_book
        .into_iter()
        .filter(|(book_id, _)| !exclude.contains(book_id))
        .map(|(book_id, (sum, mut endorsements))| {
            let score = match aggregation {
                Aggregation::Sum => sum,
                Aggregation::Mean => sum / endorsements.len() as f64,
            };
            endorsements.sort_by(|a, b| {
                b.similarity
                    .partial_cmp(&a.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.user_id.cmp(&b.user_id))
            });
            ScoredBook {
                book_id,
                score,
                source: ScoreSource::Collaborative,
                explanation: Explanation {
                    collaborative_score: score,
                    endorsements,
                    ..Default::default()
                },
            }
        })
        .collect();

    Ok(scored)
}

/// How many neighbors have read a book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerPopularity {
    pub book_id: BookId,
    pub readers: usize,
}

/// Books read by the most neighbors, at any rating.
///
/// A secondary source for when the thresholded scores come back thin. Each
/// neighbor counts once per book; ties go to the lower book id.
pub fn popular_among_similar(
    similar_users: &[UserSimilarity],
    ratings_by_similar_user: &HashMap<UserId, Vec<Rating>>,
    exclude: &HashSet<BookId>,
    limit: usize,
) -> Result<Vec<PeerPopularity>> {
    let mut readers: BTreeMap<BookId, HashSet<UserId>> = BTreeMap::new();

    for neighbor in similar_users {
        let Some(ratings) = ratings_by_similar_user.get(&neighbor.user_id) else {
            continue;
        };
        validate_ratings(ratings)?;
        for rating in ratings.iter().filter(|r| r.user_id == neighbor.user_id) {
            if !exclude.contains(&rating.book_id) {
                readers
                    .entry(rating.book_id)
                    .or_default()
                    .insert(neighbor.user_id);
            }
        }
    }

    let mut popular: Vec<PeerPopularity> = readers
        .into_iter()
        .map(|(book_id, users)| PeerPopularity {
            book_id,
            readers: users.len(),
        })
        .collect();
    // Stable sort keeps ascending book id among equal counts
    popular.sort_by(|a, b| b.readers.cmp(&a.readers));
    popular.truncate(limit);
    Ok(popular)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbor(user_id: UserId, similarity: f64) -> UserSimilarity {
        UserSimilarity {
            user_id,
            similarity,
            common_interests: Vec::new(),
        }
    }

    fn ratings(list: &[(UserId, BookId, u8)]) -> HashMap<UserId, Vec<Rating>> {
        let mut map: HashMap<UserId, Vec<Rating>> = HashMap::new();
        for &(u, b, s) in list {
            map.entry(u).or_default().push(Rating::new(u, b, s));
        }
        map
    }

    #[test]
    fn test_weighted_sum_across_neighbors() {
        let neighbors = vec![neighbor(10, 0.8), neighbor(20, 0.3)];
        let r = ratings(&[(10, 3, 5), (20, 3, 4)]);

        let scored =
            score_by_collaboration(&neighbors, &r, 4, &HashSet::new(), Aggregation::Sum).unwrap();

        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].book_id, 3);
        assert!((scored[0].score - 1.04).abs() < 1e-9);
        assert_eq!(scored[0].explanation.endorsements.len(), 2);
        assert_eq!(scored[0].explanation.endorsements[0].user_id, 10);
    }

    #[test]
    fn test_mean_aggregation() {
        let neighbors = vec![neighbor(10, 0.8), neighbor(20, 0.3)];
        let r = ratings(&[(10, 3, 5), (20, 3, 4)]);

        let scored =
            score_by_collaboration(&neighbors, &r, 4, &HashSet::new(), Aggregation::Mean).unwrap();
        assert!((scored[0].score - 0.52).abs() < 1e-9);
    }

    #[test]
    fn test_ratings_below_threshold_contribute_nothing() {
        let neighbors = vec![neighbor(10, 0.9), neighbor(20, 0.5)];
        let r = ratings(&[(10, 1, 3), (20, 1, 2), (20, 2, 4)]);

        let scored =
            score_by_collaboration(&neighbors, &r, 4, &HashSet::new(), Aggregation::Sum).unwrap();
        assert!(scored.iter().all(|s| s.book_id != 1));
        assert_eq!(scored.len(), 1);
    }

    #[test]
    fn test_excluded_books_never_appear() {
        let neighbors = vec![neighbor(10, 0.9)];
        let r = ratings(&[(10, 1, 5), (10, 2, 5)]);
        let exclude: HashSet<BookId> = [1].into_iter().collect();

        let scored = score_by_collaboration(&neighbors, &r, 4, &exclude, Aggregation::Sum).unwrap();
        assert_eq!(scored.iter().map(|s| s.book_id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_duplicate_rating_last_one_wins() {
        let neighbors = vec![neighbor(10, 1.0)];
        let r = ratings(&[(10, 1, 5), (10, 1, 2)]);

        let scored =
            score_by_collaboration(&neighbors, &r, 4, &HashSet::new(), Aggregation::Sum).unwrap();
        assert!(scored.is_empty());
    }

    #[test]
    fn test_rejects_invalid_rating() {
        let neighbors = vec![neighbor(10, 0.5)];
        let r = ratings(&[(10, 1, 6)]);
        let err = score_by_collaboration(&neighbors, &r, 4, &HashSet::new(), Aggregation::Sum)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput { field: "rating", .. }));
    }

    #[test]
    fn test_rejects_invalid_threshold() {
        let err = score_by_collaboration(&[], &HashMap::new(), 0, &HashSet::new(), Aggregation::Sum)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput { field: "rating_threshold", .. }));
    }

    #[test]
    fn test_aggregation_from_str() {
        assert_eq!("SUM".parse::<Aggregation>().unwrap(), Aggregation::Sum);
        assert_eq!(" mean ".parse::<Aggregation>().unwrap(), Aggregation::Mean);
        assert!("median".parse::<Aggregation>().is_err());
    }

    #[test]
    fn test_popular_among_similar_counts_each_reader_once() {
        let neighbors = vec![neighbor(10, 0.9), neighbor(20, 0.4), neighbor(30, 0.2)];
        let r = ratings(&[
            (10, 5, 1),
            (10, 5, 4),
            (10, 6, 2),
            (20, 6, 5),
            (20, 7, 3),
            (30, 6, 1),
            (30, 8, 5),
        ]);
        let exclude: HashSet<BookId> = [8].into_iter().collect();

        let popular = popular_among_similar(&neighbors, &r, &exclude, 3).unwrap();
        assert_eq!(
            popular,
            vec![
                PeerPopularity { book_id: 6, readers: 3 },
                PeerPopularity { book_id: 5, readers: 1 },
                PeerPopularity { book_id: 7, readers: 1 },
            ]
        );
    }

    #[test]
    fn test_popular_among_similar_rejects_bad_rating() {
        let neighbors = vec![neighbor(10, 0.9)];
        let r = ratings(&[(10, 5, 0)]);
        assert!(matches!(
            popular_among_similar(&neighbors, &r, &HashSet::new(), 5),
            Err(Error::InvalidInput { field: "rating", .. })
        ));
    }
}
