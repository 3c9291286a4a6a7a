//! Catalog access
//!
//! The engine reads users, books and ratings through [`CatalogStore`]. It
//! never writes. `PgCatalogStore` (in `crate::database`) serves production
//! traffic; [`MemoryCatalog`] holds an in-process snapshot for tests,
//! fixtures and demos.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use crate::error::{Error, Result};

use super::model::{Book, BookId, BookPopularity, Rating, User, UserId};

/// Read-only view of users, books and ratings.
///
/// Every future is `Send` so generic engines can run inside axum handlers
/// and spawned tasks.
pub trait CatalogStore: Send + Sync + 'static {
    /// Fetch a single user, `None` if unknown
    fn fetch_user(&self, user_id: UserId) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Every user; the candidate pool for neighbor selection
    fn fetch_users(&self) -> impl Future<Output = Result<Vec<User>>> + Send;

    /// Fetch a single book, `None` if unknown
    fn fetch_book(&self, book_id: BookId) -> impl Future<Output = Result<Option<Book>>> + Send;

    /// Every book in the catalog
    fn fetch_books(&self) -> impl Future<Output = Result<Vec<Book>>> + Send;

    /// All ratings by the given users, grouped by user
    fn fetch_ratings_for_users(
        &self,
        user_ids: &[UserId],
    ) -> impl Future<Output = Result<HashMap<UserId, Vec<Rating>>>> + Send;

    /// A user's own rating history
    fn fetch_user_ratings(&self, user_id: UserId)
        -> impl Future<Output = Result<Vec<Rating>>> + Send;

    /// All ratings a book has received
    fn fetch_book_ratings(&self, book_id: BookId)
        -> impl Future<Output = Result<Vec<Rating>>> + Send;

    /// Most-rated books first, then higher average, then lower id.
    /// Unrated books sort last with a count of zero.
    fn fetch_popular_books(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<BookPopularity>>> + Send;

    /// Newest additions to the catalog first
    fn fetch_recent_books(&self, limit: usize) -> impl Future<Output = Result<Vec<Book>>> + Send;

    /// Whether the backing storage is reachable
    fn health_check(&self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// In-memory catalog snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryCatalog {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    books: Vec<Book>,
    #[serde(default)]
    ratings: Vec<Rating>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot from JSON: `{"users": [...], "books": [...], "ratings": [...]}`.
    /// Duplicate (user, book) ratings collapse to the last one.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: MemoryCatalog = serde_json::from_str(json)?;
        let mut catalog = MemoryCatalog {
            users: raw.users,
            books: raw.books,
            ratings: Vec::with_capacity(raw.ratings.len()),
        };
        for rating in raw.ratings {
            catalog.upsert_rating(rating)?;
        }
        Ok(catalog)
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.upsert_user(user);
        self
    }

    pub fn with_book(mut self, book: Book) -> Self {
        self.upsert_book(book);
        self
    }

    /// Builder form of [`upsert_rating`](Self::upsert_rating)
    pub fn with_rating(mut self, user_id: UserId, book_id: BookId, score: u8) -> Result<Self> {
        self.upsert_rating(Rating::new(user_id, book_id, score))?;
        Ok(self)
    }

    pub fn upsert_user(&mut self, user: User) {
        match self.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => self.users.push(user),
        }
    }

    pub fn upsert_book(&mut self, book: Book) {
        match self.books.iter_mut().find(|b| b.id == book.id) {
            Some(existing) => *existing = book,
            None => self.books.push(book),
        }
    }

    /// Insert or replace the rating for `(user, book)`
    pub fn upsert_rating(&mut self, rating: Rating) -> Result<()> {
        if !rating.is_valid() {
            return Err(Error::invalid_input(
                "rating",
                format!("score {} outside 1..=5", rating.score),
            ));
        }
        match self
            .ratings
            .iter_mut()
            .find(|r| r.user_id == rating.user_id && r.book_id == rating.book_id)
        {
            Some(existing) => *existing = rating,
            None => self.ratings.push(rating),
        }
        Ok(())
    }
}

impl CatalogStore for MemoryCatalog {
    async fn fetch_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn fetch_users(&self) -> Result<Vec<User>> {
        Ok(self.users.clone())
    }

    async fn fetch_book(&self, book_id: BookId) -> Result<Option<Book>> {
        Ok(self.books.iter().find(|b| b.id == book_id).cloned())
    }

    async fn fetch_books(&self) -> Result<Vec<Book>> {
        Ok(self.books.clone())
    }

    async fn fetch_ratings_for_users(
        &self,
        user_ids: &[UserId],
    ) -> Result<HashMap<UserId, Vec<Rating>>> {
        let mut grouped: BTreeMap<UserId, Vec<Rating>> = BTreeMap::new();
        for rating in self.ratings.iter().filter(|r| user_ids.contains(&r.user_id)) {
            grouped.entry(rating.user_id).or_default().push(*rating);
        }
        Ok(grouped.into_iter().collect())
    }

    async fn fetch_user_ratings(&self, user_id: UserId) -> Result<Vec<Rating>> {
        Ok(self
            .ratings
            .iter()
            .filter(|r| r.user_id == user_id)
            .copied()
            .collect())
    }

    async fn fetch_book_ratings(&self, book_id: BookId) -> Result<Vec<Rating>> {
        Ok(self
            .ratings
            .iter()
            .filter(|r| r.book_id == book_id)
            .copied()
            .collect())
    }

    async fn fetch_popular_books(&self, limit: usize) -> Result<Vec<BookPopularity>> {
        let mut popular: Vec<BookPopularity> = self
            .books
            .iter()
            .map(|book| {
                let scores: Vec<f64> = self
                    .ratings
                    .iter()
                    .filter(|r| r.book_id == book.id)
                    .map(|r| f64::from(r.score))
                    .collect();
                let average_rating = if scores.is_empty() {
                    None
                } else {
                    Some(scores.iter().sum::<f64>() / scores.len() as f64)
                };
                BookPopularity {
                    book: book.clone(),
                    rating_count: scores.len(),
                    average_rating,
                }
            })
            .collect();

        popular.sort_by(|a, b| {
            b.rating_count
                .cmp(&a.rating_count)
                .then_with(|| {
                    b.average_rating
                        .unwrap_or(0.0)
                        .partial_cmp(&a.average_rating.unwrap_or(0.0))
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.book.id.cmp(&b.book.id))
        });
        popular.truncate(limit);
        Ok(popular)
    }

    /// Insertion order stands in for creation time
    async fn fetch_recent_books(&self, limit: usize) -> Result<Vec<Book>> {
        Ok(self.books.iter().rev().take(limit).cloned().collect())
    }
}
