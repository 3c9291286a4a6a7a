//! Recommendation Engine
//!
//! Entry point of the pipeline. Reads one consistent snapshot from the
//! catalog, then runs:
//!
//! 1. content scoring against the reader's interests
//! 2. neighbor selection and collaborative scoring
//! 3. hybrid ranking with exclusion of already-rated books
//!
//! The engine holds no per-user state; every call gets its parameters
//! explicitly through [`EngineConfig`].

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};

use super::collaborative::{
    popular_among_similar, score_by_collaboration, validate_rating_threshold, validate_ratings,
    Aggregation, PeerPopularity,
};
use super::content::score_by_content;
use super::fallback::{fallback_books, FallbackBook};
use super::genres::GenreSet;
use super::hybrid::{combine, HybridWeights};
use super::metrics::{PerformanceTimer, QualityAnalyzer, RecommendationMetrics};
use super::model::{
    Book, BookId, Endorsement, Explanation, ScoredBook, User, UserId, UserSimilarity,
};
use super::similarity::find_similar_users;
use super::store::CatalogStore;

/// Average rating at which a book counts as "highly rated" in explanations
const HIGHLY_RATED_AVERAGE: f64 = 4.0;

/// Per-call tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub content_weight: f64,
    pub collaborative_weight: f64,
    /// Neighbors strictly below this Jaccard similarity are ignored
    pub min_similarity: f64,
    pub max_similar_users: usize,
    /// Lowest star rating counted as an endorsement
    pub rating_threshold: u8,
    pub result_limit: usize,
    pub aggregation: Aggregation,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            content_weight: 0.5,
            collaborative_weight: 0.5,
            min_similarity: 0.1,
            max_similar_users: 50,
            rating_threshold: 4,
            result_limit: 10,
            aggregation: Aggregation::Sum,
        }
    }
}

impl EngineConfig {
    pub fn weights(&self) -> HybridWeights {
        HybridWeights::new(self.content_weight, self.collaborative_weight)
    }

    /// Reject the whole call up front rather than failing halfway through
    pub fn validate(&self) -> Result<()> {
        self.weights().validate()?;
        if !self.min_similarity.is_finite() || !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(Error::invalid_input(
                "min_similarity",
                format!("{} is outside [0, 1]", self.min_similarity),
            ));
        }
        validate_rating_threshold(self.rating_threshold)
    }
}

/// Which signals produced the list. Lets the presentation layer tell
/// "no collaborative data yet" apart from a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    /// Both interests and neighbor ratings contributed
    Personalized,
    /// Interests only: no neighbor endorsements yet
    ContentOnly,
    /// Nothing to go on; the list is empty.
    ///
    /// Neighbors are chosen by interest overlap, so a reader without
    /// interests has no collaborative signal either and always lands here.
    NoSignal,
}

impl RecommendationStatus {
    fn from_output(items: &[ScoredBook], has_collaborative: bool) -> Self {
        if items.is_empty() {
            RecommendationStatus::NoSignal
        } else if has_collaborative {
            RecommendationStatus::Personalized
        } else {
            RecommendationStatus::ContentOnly
        }
    }
}

/// Result of a recommendation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendations {
    pub user_id: UserId,
    pub status: RecommendationStatus,
    pub items: Vec<ScoredBook>,
    pub similar_users: Vec<UserSimilarity>,
    /// Popular and recent books, filled only when `status` is `NoSignal`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback: Vec<FallbackBook>,
    pub metrics: RecommendationMetrics,
}

/// Why a specific book suits a specific reader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationExplanation {
    pub user_id: UserId,
    pub book_id: BookId,
    pub matching_genres: Vec<String>,
    pub endorsements: Vec<Endorsement>,
    pub average_rating: Option<f64>,
    pub summary: String,
}

/// What signals are available for a reader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationStats {
    pub user_id: UserId,
    pub interests_count: usize,
    pub books_rated: usize,
    pub similar_users_count: usize,
    pub can_use_content_based: bool,
    pub can_use_collaborative: bool,
}

/// Main recommendation engine
pub struct RecommendationEngine<S> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S> Clone for RecommendationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: CatalogStore> RecommendationEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self {
            store: Arc::new(store),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Recommendations using the engine's default configuration
    pub async fn recommend(&self, user_id: UserId) -> Result<Recommendations> {
        self.recommend_with(user_id, &self.config).await
    }

    /// Recommendations for `user_id` with an explicit per-call configuration
    #[instrument(skip(self, config), fields(limit = config.result_limit))]
    pub async fn recommend_with(
        &self,
        user_id: UserId,
        config: &EngineConfig,
    ) -> Result<Recommendations> {
        let timer = PerformanceTimer::new("recommend");
        config.validate()?;

        let target = self.load_user(user_id).await?;

        // Everything the reader has rated, at any score, is off the table
        let own_ratings = self.store.fetch_user_ratings(user_id).await?;
        validate_ratings(&own_ratings)?;
        let exclude: HashSet<BookId> = own_ratings.iter().map(|r| r.book_id).collect();

        let books = self.store.fetch_books().await?;
        let candidates: Vec<Book> = books
            .into_iter()
            .filter(|b| !exclude.contains(&b.id))
            .collect();

        // 1. Content
        let content_scores = score_by_content(&target.interests, &candidates);
        let has_content = !target.interests.is_empty() && !content_scores.is_empty();

        // 2. Collaborative
        let pool = self.store.fetch_users().await?;
        let similar_users = find_similar_users(
            &target,
            &pool,
            config.min_similarity,
            config.max_similar_users,
        )?;
        let collaborative_scores = self
            .collaborative_scores(&similar_users, config, &exclude)
            .await?;
        let has_collaborative = !collaborative_scores.is_empty();

        // 3. Hybrid. Without interests the content stage has no opinion and
        // contributes no candidates, which leaves the list empty.
        let content_input: &[ScoredBook] = if has_content { &content_scores } else { &[] };
        let items = combine(
            content_input,
            &collaborative_scores,
            config.weights(),
            &exclude,
            config.result_limit,
        )?;

        let status = RecommendationStatus::from_output(&items, has_collaborative);
        let fallback = if status == RecommendationStatus::NoSignal {
            self.fallback_excluding(&exclude, config.result_limit).await?
        } else {
            Vec::new()
        };

        let mut metrics = RecommendationMetrics {
            user_id,
            candidates_considered: candidates.len(),
            excluded_books: exclude.len(),
            similar_users: similar_users.len(),
            collaborative_candidates: collaborative_scores.len(),
            ..Default::default()
        };
        let book_index: HashMap<BookId, &Book> = candidates.iter().map(|b| (b.id, b)).collect();
        metrics.record_output(&items, &book_index);
        metrics.total_duration_ms = timer.elapsed_ms();
        timer.log_if_slow(200);

        let issues = QualityAnalyzer::detect_issues(&metrics);
        if !issues.is_empty() {
            debug!("Quality issues for user {}: {:?}", user_id, issues);
        }

        info!(
            "📚 {} recommendations for user {} ({:?}, {} neighbors, {} candidates)",
            items.len(),
            user_id,
            status,
            similar_users.len(),
            candidates.len()
        );

        Ok(Recommendations {
            user_id,
            status,
            items,
            similar_users,
            fallback,
            metrics,
        })
    }

    /// Content recommendations for an ad-hoc genre list, e.g. a visitor
    /// without an account. Books with no shared genre are left out.
    #[instrument(skip(self, exclude), fields(genres = genres.len()))]
    pub async fn recommend_for_genres(
        &self,
        genres: &GenreSet,
        exclude: &HashSet<BookId>,
        limit: usize,
    ) -> Result<Vec<ScoredBook>> {
        if genres.is_empty() {
            return Ok(Vec::new());
        }

        let candidates: Vec<Book> = self
            .store
            .fetch_books()
            .await?
            .into_iter()
            .filter(|b| !exclude.contains(&b.id))
            .collect();

        let scored: Vec<ScoredBook> = score_by_content(genres, &candidates)
            .into_iter()
            .filter(|s| s.score > 0.0)
            .collect();

        combine(&scored, &[], HybridWeights::new(1.0, 0.0), exclude, limit)
    }

    /// Popular, then recent, books the reader has not rated yet
    pub async fn fallback(&self, user_id: UserId, limit: usize) -> Result<Vec<FallbackBook>> {
        self.load_user(user_id).await?;
        let exclude: HashSet<BookId> = self
            .store
            .fetch_user_ratings(user_id)
            .await?
            .iter()
            .map(|r| r.book_id)
            .collect();
        self.fallback_excluding(&exclude, limit).await
    }

    /// Books read by the most neighbors, whatever they thought of them
    pub async fn popular_among_similar_users(
        &self,
        user_id: UserId,
        config: &EngineConfig,
        limit: usize,
    ) -> Result<Vec<PeerPopularity>> {
        let similar = self.similar_users(user_id, config).await?;
        if similar.is_empty() {
            return Ok(Vec::new());
        }

        let exclude: HashSet<BookId> = self
            .store
            .fetch_user_ratings(user_id)
            .await?
            .iter()
            .map(|r| r.book_id)
            .collect();
        let neighbor_ids: Vec<UserId> = similar.iter().map(|s| s.user_id).collect();
        let ratings = self.store.fetch_ratings_for_users(&neighbor_ids).await?;

        popular_among_similar(&similar, &ratings, &exclude, limit)
    }

    /// Neighbors of `user_id` by interest overlap
    pub async fn similar_users(
        &self,
        user_id: UserId,
        config: &EngineConfig,
    ) -> Result<Vec<UserSimilarity>> {
        config.validate()?;
        let target = self.load_user(user_id).await?;
        let pool = self.store.fetch_users().await?;
        find_similar_users(
            &target,
            &pool,
            config.min_similarity,
            config.max_similar_users,
        )
    }

    /// Books sharing genres with `book_id`, best overlap first.
    /// Books with no genre in common are left out.
    pub async fn similar_books(&self, book_id: BookId, limit: usize) -> Result<Vec<ScoredBook>> {
        let book = self
            .store
            .fetch_book(book_id)
            .await?
            .ok_or_else(|| Error::not_found("book", book_id))?;

        let others: Vec<Book> = self
            .store
            .fetch_books()
            .await?
            .into_iter()
            .filter(|b| b.id != book_id)
            .collect();

        let scored: Vec<ScoredBook> = score_by_content(&book.genres, &others)
            .into_iter()
            .filter(|s| s.score > 0.0)
            .collect();

        let exclude: HashSet<BookId> = [book_id].into_iter().collect();
        combine(&scored, &[], HybridWeights::new(1.0, 0.0), &exclude, limit)
    }

    /// Explain why `book_id` suits `user_id`: shared genres, neighbor
    /// endorsements and overall reception.
    pub async fn explain(
        &self,
        user_id: UserId,
        book_id: BookId,
        config: &EngineConfig,
    ) -> Result<RecommendationExplanation> {
        config.validate()?;
        let target = self.load_user(user_id).await?;
        let book = self
            .store
            .fetch_book(book_id)
            .await?
            .ok_or_else(|| Error::not_found("book", book_id))?;

        let matching_genres: Vec<String> = target
            .interests
            .intersection(&book.genres)
            .map(str::to_string)
            .collect();

        let pool = self.store.fetch_users().await?;
        let similar = find_similar_users(
            &target,
            &pool,
            config.min_similarity,
            config.max_similar_users,
        )?;
        let endorsements = self
            .collaborative_scores(&similar, config, &HashSet::new())
            .await?
            .into_iter()
            .find(|s| s.book_id == book_id)
            .map(|s| s.explanation.endorsements)
            .unwrap_or_default();

        let book_ratings = self.store.fetch_book_ratings(book_id).await?;
        validate_ratings(&book_ratings)?;
        let average_rating = if book_ratings.is_empty() {
            None
        } else {
            let total: f64 = book_ratings.iter().map(|r| f64::from(r.score)).sum();
            Some(((total / book_ratings.len() as f64) * 10.0).round() / 10.0)
        };

        let explanation = Explanation {
            matching_genres: matching_genres.clone(),
            endorsements: endorsements.clone(),
            ..Default::default()
        };
        let mut summary = explanation.summary();
        if let Some(avg) = average_rating.filter(|avg| *avg >= HIGHLY_RATED_AVERAGE) {
            summary = format!("{} • Highly rated by readers ({:.1}★ average)", summary, avg);
        }

        Ok(RecommendationExplanation {
            user_id,
            book_id,
            matching_genres,
            endorsements,
            average_rating,
            summary,
        })
    }

    /// Which recommendation sources can serve this reader
    pub async fn stats(&self, user_id: UserId, config: &EngineConfig) -> Result<RecommendationStats> {
        let similar = self.similar_users(user_id, config).await?;
        let target = self.load_user(user_id).await?;
        let books_rated = self.store.fetch_user_ratings(user_id).await?.len();

        Ok(RecommendationStats {
            user_id,
            interests_count: target.interests.len(),
            books_rated,
            similar_users_count: similar.len(),
            can_use_content_based: !target.interests.is_empty(),
            can_use_collaborative: !similar.is_empty(),
        })
    }

    async fn load_user(&self, user_id: UserId) -> Result<User> {
        self.store
            .fetch_user(user_id)
            .await?
            .ok_or_else(|| Error::not_found("user", user_id))
    }

    async fn fallback_excluding(
        &self,
        exclude: &HashSet<BookId>,
        limit: usize,
    ) -> Result<Vec<FallbackBook>> {
        // Over-fetch so excluded books do not starve the list
        let fetch = limit.saturating_add(exclude.len());
        let popular = self.store.fetch_popular_books(fetch).await?;
        let recent = self.store.fetch_recent_books(fetch).await?;
        let picked = fallback_books(&popular, &recent, exclude, limit);
        debug!("Fallback picked {} books", picked.len());
        Ok(picked)
    }

    async fn collaborative_scores(
        &self,
        similar_users: &[UserSimilarity],
        config: &EngineConfig,
        exclude: &HashSet<BookId>,
    ) -> Result<Vec<ScoredBook>> {
        if similar_users.is_empty() {
            return Ok(Vec::new());
        }
        let neighbor_ids: Vec<UserId> = similar_users.iter().map(|s| s.user_id).collect();
        let ratings = self.store.fetch_ratings_for_users(&neighbor_ids).await?;
        score_by_collaboration(
            similar_users,
            &ratings,
            config.rating_threshold,
            exclude,
            config.aggregation,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::model::ScoreSource;
    use crate::recommendation::store::MemoryCatalog;

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new()
            .with_user(User::new(1, ["fantasy", "mystery"]))
            .with_user(User::new(2, ["fantasy", "mystery"]))
            .with_user(User::new(3, ["fantasy", "romance"]))
            .with_user(User::new(4, Vec::<String>::new()))
            .with_book(Book::new(10, "Wizard", "Le Guin", ["Fantasy", "Mystery"]))
            .with_book(Book::new(11, "Hearts", "Austen", ["Romance"]))
            .with_book(Book::new(12, "Cases", "Christie", ["Mystery"]))
            .with_rating(2, 11, 5)
            .unwrap()
            .with_rating(2, 12, 3)
            .unwrap()
            .with_rating(1, 10, 2)
            .unwrap()
    }

    #[tokio::test]
    async fn test_recommend_combines_both_signals() {
        let engine = RecommendationEngine::new(catalog());
        let recs = engine.recommend(1).await.unwrap();

        assert_eq!(recs.status, RecommendationStatus::Personalized);
        assert!(recs.items.iter().all(|s| s.book_id != 10));
        // Book 11: collaborative 1.0×1.0 → 0.5 ; book 12: content 0.5 → 0.25
        assert_eq!(
            recs.items.iter().map(|s| s.book_id).collect::<Vec<_>>(),
            vec![11, 12]
        );
        assert_eq!(recs.items[0].source, ScoreSource::Collaborative);
        assert_eq!(recs.similar_users[0].user_id, 2);
    }

    #[tokio::test]
    async fn test_user_without_interests_gets_no_signal() {
        let engine = RecommendationEngine::new(catalog());
        let recs = engine.recommend(4).await.unwrap();
        assert_eq!(recs.status, RecommendationStatus::NoSignal);
        assert!(recs.items.is_empty());
        assert!(recs.similar_users.is_empty());

        // Same rating count everywhere, so higher average goes first
        let fallback: Vec<BookId> = recs.fallback.iter().map(|f| f.book_id).collect();
        assert_eq!(fallback, vec![11, 12, 10]);
    }

    #[tokio::test]
    async fn test_personalized_result_has_no_fallback() {
        let engine = RecommendationEngine::new(catalog());
        let recs = engine.recommend(1).await.unwrap();
        assert!(recs.fallback.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_skips_rated_books() {
        let engine = RecommendationEngine::new(catalog());
        let fallback = engine.fallback(1, 10).await.unwrap();
        assert!(fallback.iter().all(|f| f.book_id != 10));
        assert_eq!(fallback.len(), 2);

        assert!(matches!(
            engine.fallback(99, 10).await,
            Err(Error::NotFound { entity_type: "user", .. })
        ));
    }

    #[tokio::test]
    async fn test_recommend_for_genres() {
        let engine = RecommendationEngine::new(catalog());

        let genres: GenreSet = ["Fantasy", "romance"].into_iter().collect();
        let recs = engine
            .recommend_for_genres(&genres, &HashSet::new(), 5)
            .await
            .unwrap();
        // 11: 1/2, 10: 1/3, 12 shares nothing
        assert_eq!(recs.iter().map(|s| s.book_id).collect::<Vec<_>>(), vec![11, 10]);

        let exclude: HashSet<BookId> = [11].into_iter().collect();
        let recs = engine.recommend_for_genres(&genres, &exclude, 5).await.unwrap();
        assert_eq!(recs.iter().map(|s| s.book_id).collect::<Vec<_>>(), vec![10]);

        let none = engine
            .recommend_for_genres(&GenreSet::default(), &HashSet::new(), 5)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_popular_among_similar_users() {
        let engine = RecommendationEngine::new(catalog());
        let popular = engine
            .popular_among_similar_users(1, &EngineConfig::default(), 5)
            .await
            .unwrap();
        // Neighbor 2 read 11 and 12; the reader's own book 10 is left out
        assert_eq!(
            popular.iter().map(|p| p.book_id).collect::<Vec<_>>(),
            vec![11, 12]
        );
        assert!(popular.iter().all(|p| p.readers == 1));

        let none = engine
            .popular_among_similar_users(4, &EngineConfig::default(), 5)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let engine = RecommendationEngine::new(catalog());
        assert!(matches!(
            engine.recommend(99).await,
            Err(Error::NotFound { entity_type: "user", .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_any_work() {
        let engine = RecommendationEngine::new(catalog());
        let config = EngineConfig {
            collaborative_weight: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            engine.recommend_with(1, &config).await,
            Err(Error::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_similar_books_drops_unrelated() {
        let engine = RecommendationEngine::new(catalog());
        let similar = engine.similar_books(10, 5).await.unwrap();
        assert_eq!(similar.iter().map(|s| s.book_id).collect::<Vec<_>>(), vec![12]);
        assert!((similar[0].score - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_explain_and_stats() {
        let engine = RecommendationEngine::new(catalog());
        let config = EngineConfig::default();

        let explanation = engine.explain(1, 11, &config).await.unwrap();
        assert!(explanation.matching_genres.is_empty());
        assert_eq!(explanation.endorsements.len(), 1);
        assert_eq!(explanation.average_rating, Some(5.0));
        assert!(explanation.summary.contains("Highly rated"));

        let stats = engine.stats(1, &config).await.unwrap();
        assert_eq!(stats.interests_count, 2);
        assert_eq!(stats.books_rated, 1);
        assert_eq!(stats.similar_users_count, 2);
        assert!(stats.can_use_content_based && stats.can_use_collaborative);
    }
}
