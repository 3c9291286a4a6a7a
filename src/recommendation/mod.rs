//! Recommendation Module
//!
//! Hybrid book recommendations from two signals: declared genre interests
//! and the ratings of readers with similar taste.
//!
//! ## Architecture
//!
//! 1. **Genres** - Normalized genre sets and Jaccard similarity
//! 2. **Content** - Score books by genre overlap with the reader's interests
//! 3. **Similarity** - Find readers whose interests overlap the target's
//! 4. **Collaborative** - Aggregate high ratings from those readers per book
//! 5. **Hybrid** - Weighted merge, exclusion of already-rated books, ranking
//! 6. **Engine** - Fetches a snapshot from a [`CatalogStore`] and runs the stages
//! 7. **Fallback** - Popular and recent books for readers with no signal
//!
//! ## Scoring
//!
//! - Content: `jaccard(interests, book.genres)`
//! - Collaborative: `Σ similarity × rating / 5` over neighbor ratings at or
//!   above the threshold (or the mean, see [`Aggregation`])
//! - Combined: `content_weight × content + collaborative_weight × collaborative`

pub mod collaborative;
pub mod content;
pub mod engine;
pub mod fallback;
pub mod genres;
pub mod hybrid;
pub mod metrics;
pub mod model;
pub mod similarity;
pub mod store;

pub use collaborative::{
    popular_among_similar, score_by_collaboration, Aggregation, PeerPopularity,
};
pub use content::score_by_content;
pub use engine::{
    EngineConfig, RecommendationEngine, RecommendationExplanation, RecommendationStats,
    RecommendationStatus, Recommendations,
};
pub use fallback::{fallback_books, FallbackBook, FallbackReason};
pub use genres::{jaccard, GenreSet};
pub use hybrid::{combine, HybridWeights};
pub use model::{
    Book, BookId, BookPopularity, Endorsement, Explanation, Rating, ScoreSource, ScoredBook,
    User, UserId, UserSimilarity,
};
pub use similarity::find_similar_users;
pub use store::{CatalogStore, MemoryCatalog};
