//! Recommendation data model
//!
//! Value objects read from storage for a single request, plus the derived
//! score records produced by the scoring stages.

use serde::{Deserialize, Serialize};

use super::genres::GenreSet;

pub type UserId = i64;
pub type BookId = i64;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// A reader and their declared genre interests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub interests: GenreSet,
}

impl User {
    pub fn new<I, S>(id: UserId, interests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            id,
            username: format!("user-{}", id),
            interests: interests.into_iter().collect(),
        }
    }
}

/// A catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub genres: GenreSet,
}

impl Book {
    pub fn new<I, S>(id: BookId, title: &str, author: &str, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            id,
            title: title.to_string(),
            author: author.to_string(),
            genres: genres.into_iter().collect(),
        }
    }
}

/// A star rating, 1 to 5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub book_id: BookId,
    pub score: u8,
}

impl Rating {
    pub fn new(user_id: UserId, book_id: BookId, score: u8) -> Self {
        Self {
            user_id,
            book_id,
            score,
        }
    }

    pub fn is_valid(&self) -> bool {
        (MIN_RATING..=MAX_RATING).contains(&self.score)
    }

    /// Rating scaled to `(0, 1]`
    pub fn normalized(&self) -> f64 {
        f64::from(self.score) / f64::from(MAX_RATING)
    }
}

/// Which stage produced a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// Genre overlap with the reader's interests
    Content,
    /// Endorsed by readers with similar taste
    Collaborative,
    /// Both signals contributed
    Hybrid,
}

impl ScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreSource::Content => "content",
            ScoreSource::Collaborative => "collaborative",
            ScoreSource::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for ScoreSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A similar reader's high rating that contributed to a collaborative score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endorsement {
    pub user_id: UserId,
    pub rating: u8,
    pub similarity: f64,
}

/// Why a book received its score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub content_score: f64,
    pub collaborative_score: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matching_genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endorsements: Vec<Endorsement>,
}

impl Explanation {
    /// Human readable one-liner for the presentation layer
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if !self.matching_genres.is_empty() {
            let shown: Vec<&str> = self
                .matching_genres
                .iter()
                .take(3)
                .map(String::as_str)
                .collect();
            parts.push(format!("Matches your interest in {}", shown.join(", ")));
        }

        match self.endorsements.len() {
            0 => {}
            1 => parts.push(format!(
                "Recommended by a reader with similar taste (rated {}★)",
                self.endorsements[0].rating
            )),
            n => {
                let avg = self
                    .endorsements
                    .iter()
                    .map(|e| f64::from(e.rating))
                    .sum::<f64>()
                    / n as f64;
                parts.push(format!(
                    "Loved by {} readers with similar taste (avg {:.1}★)",
                    n, avg
                ));
            }
        }

        if parts.is_empty() {
            "Based on your reading preferences".to_string()
        } else {
            parts.join(" • ")
        }
    }
}

/// A book with a score from one of the stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredBook {
    pub book_id: BookId,
    pub score: f64,
    pub source: ScoreSource,
    pub explanation: Explanation,
}

/// A book with its aggregate reception, for popularity listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookPopularity {
    pub book: Book,
    pub rating_count: usize,
    /// `None` when nobody has rated the book
    pub average_rating: Option<f64>,
}

/// A neighbor reader and how close their interests are to the target's
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSimilarity {
    pub user_id: UserId,
    pub similarity: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub common_interests: Vec<String>,
}
