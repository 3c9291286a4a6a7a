//! Recommendation Metrics and Performance Monitoring
//!
//! Per-request timing and quality summaries, logged at debug level for
//! tuning weights and thresholds.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use super::model::{Book, BookId, ScoredBook};

/// Metrics for a single recommendation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationMetrics {
    pub user_id: i64,
    pub request_id: String,
    pub timestamp: i64,

    // Performance metrics
    pub total_duration_ms: u64,

    // Pipeline metrics
    pub candidates_considered: usize,
    pub excluded_books: usize,
    pub similar_users: usize,
    pub collaborative_candidates: usize,
    pub recommendations_returned: usize,
    pub avg_score: f64,
    pub source_distribution: HashMap<String, usize>, // source -> count

    // Diversity metrics
    pub unique_authors: usize,
    pub unique_genres: usize,
}

impl Default for RecommendationMetrics {
    fn default() -> Self {
        Self {
            user_id: 0,
            request_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            total_duration_ms: 0,
            candidates_considered: 0,
            excluded_books: 0,
            similar_users: 0,
            collaborative_candidates: 0,
            recommendations_returned: 0,
            avg_score: 0.0,
            source_distribution: HashMap::new(),
            unique_authors: 0,
            unique_genres: 0,
        }
    }
}

impl RecommendationMetrics {
    /// Fill the output-derived fields from the final list
    pub fn record_output(&mut self, items: &[ScoredBook], books: &HashMap<BookId, &Book>) {
        self.recommendations_returned = items.len();
        self.avg_score = if items.is_empty() {
            0.0
        } else {
            items.iter().map(|s| s.score).sum::<f64>() / items.len() as f64
        };

        self.source_distribution.clear();
        let mut authors = HashSet::new();
        let mut genres = HashSet::new();
        for item in items {
            *self
                .source_distribution
                .entry(item.source.as_str().to_string())
                .or_insert(0) += 1;

            if let Some(book) = books.get(&item.book_id) {
                authors.insert(book.author.to_lowercase());
                genres.extend(book.genres.iter());
            }
        }
        self.unique_authors = authors.len();
        self.unique_genres = genres.len();
    }
}

/// Performance timer for tracking operation duration
pub struct PerformanceTimer {
    start: Instant,
    label: String,
}

impl PerformanceTimer {
    pub fn new(label: &str) -> Self {
        Self {
            start: Instant::now(),
            label: label.to_string(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn log_if_slow(&self, threshold_ms: u64) {
        let elapsed = self.elapsed_ms();
        if elapsed > threshold_ms {
            tracing::warn!(
                "⚠️ Slow operation: {} took {}ms (threshold: {}ms)",
                self.label,
                elapsed,
                threshold_ms
            );
        }
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        let elapsed = self.elapsed_ms();
        tracing::debug!("⏱️ {} completed in {}ms", self.label, elapsed);
    }
}

/// Recommendation quality analyzer
pub struct QualityAnalyzer;

impl QualityAnalyzer {
    /// Author diversity (0-1, higher is better)
    pub fn diversity_score(unique_authors: usize, total_recommendations: usize) -> f64 {
        if total_recommendations == 0 {
            return 0.0;
        }
        unique_authors as f64 / total_recommendations as f64
    }

    /// Share of recommendations backed by peer ratings (0-1)
    pub fn social_proof_ratio(metrics: &RecommendationMetrics) -> f64 {
        if metrics.recommendations_returned == 0 {
            return 0.0;
        }
        let backed = ["collaborative", "hybrid"]
            .iter()
            .filter_map(|s| metrics.source_distribution.get(*s))
            .sum::<usize>();
        backed as f64 / metrics.recommendations_returned as f64
    }

    /// Detect potential issues with recommendation quality
    pub fn detect_issues(metrics: &RecommendationMetrics) -> Vec<String> {
        let mut issues = Vec::new();

        if metrics.recommendations_returned > 0 {
            let diversity =
                Self::diversity_score(metrics.unique_authors, metrics.recommendations_returned);
            if diversity < 0.3 {
                issues.push(format!("Low author diversity: {:.2}", diversity));
            }
        }

        if metrics.total_duration_ms > 200 {
            issues.push(format!("Slow response: {}ms", metrics.total_duration_ms));
        }

        if metrics.similar_users == 0 {
            issues.push("No similar users: collaborative signal unavailable".to_string());
        } else if metrics.recommendations_returned > 0 {
            // Neighbors exist but barely show up in the list
            let social_proof = Self::social_proof_ratio(metrics);
            if social_proof < 0.2 {
                issues.push(format!("Low social proof: {:.2}", social_proof));
            }
        }

        if metrics.recommendations_returned > 0 && metrics.avg_score < 0.1 {
            issues.push(format!("Low avg score: {:.2}", metrics.avg_score));
        }

        issues
    }
}
