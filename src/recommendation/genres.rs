//! Genre Set Utilities
//!
//! Normalized genre tag collections and the Jaccard overlap metric shared by
//! content scoring and user similarity.
//!
//! Genre strings arrive as free text from several sources ("Science Fiction",
//! " fantasy ", "MYSTERY"). They are normalized exactly once, when a
//! [`GenreSet`] is built: trimmed, lowercased, deduplicated, and blank entries
//! dropped. Everything downstream compares normalized values only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A normalized, deduplicated set of genre tags.
///
/// Backed by a `BTreeSet` so iteration order is stable (alphabetical), which
/// keeps explanations and serialized output reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct GenreSet(BTreeSet<String>);

impl GenreSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Normalize a single genre tag. Returns `None` for blank input.
    pub fn normalize(genre: &str) -> Option<String> {
        let trimmed = genre.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_lowercase())
        }
    }

    pub fn insert(&mut self, genre: &str) -> bool {
        match Self::normalize(genre) {
            Some(g) => self.0.insert(g),
            None => false,
        }
    }

    pub fn contains(&self, genre: &str) -> bool {
        Self::normalize(genre).is_some_and(|g| self.0.contains(&g))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Genres present in both sets, in alphabetical order.
    pub fn intersection<'a>(&'a self, other: &'a GenreSet) -> impl Iterator<Item = &'a str> {
        self.0.intersection(&other.0).map(String::as_str)
    }

    pub fn intersection_len(&self, other: &GenreSet) -> usize {
        self.0.intersection(&other.0).count()
    }

    /// `|a ∪ b|` computed from the intersection, without allocating.
    pub fn union_len(&self, other: &GenreSet) -> usize {
        self.len() + other.len() - self.intersection_len(other)
    }
}

impl<S: AsRef<str>> FromIterator<S> for GenreSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = GenreSet::new();
        for genre in iter {
            set.insert(genre.as_ref());
        }
        set
    }
}

impl From<Vec<String>> for GenreSet {
    fn from(genres: Vec<String>) -> Self {
        genres.into_iter().collect()
    }
}

impl From<GenreSet> for Vec<String> {
    fn from(set: GenreSet) -> Self {
        set.0.into_iter().collect()
    }
}

/// Jaccard similarity `|a ∩ b| / |a ∪ b|`, in `[0, 1]`.
///
/// Two empty sets score 0, not 1: an empty set carries no information, so
/// two of them are not considered "identical tastes". Likewise an empty set
/// against a non-empty one scores 0.
pub fn jaccard(a: &GenreSet, b: &GenreSet) -> f64 {
    let union = a.union_len(b);
    if union == 0 {
        return 0.0;
    }
    a.intersection_len(b) as f64 / union as f64
}
