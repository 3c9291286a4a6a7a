//! Hybrid ranking
//!
//! Merges content and collaborative scores into one ordered list:
//!
//! ```text
//! combined = content_weight × content + collaborative_weight × collaborative
//! ```
//!
//! Outer join over book ids, a missing side counts as 0. Ties go to the
//! higher collaborative score, then the higher content score, then the
//! lower book id. A zero weight therefore never erases the other signal's
//! ordering.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::error::{Error, Result};

use super::model::{BookId, Explanation, ScoreSource, ScoredBook};

/// Relative weight of each signal in the combined score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub content: f64,
    pub collaborative: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            content: 0.5,
            collaborative: 0.5,
        }
    }
}

impl HybridWeights {
    pub fn new(content: f64, collaborative: f64) -> Self {
        Self {
            content,
            collaborative,
        }
    }

    /// Weights must be finite and non-negative
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("content_weight", self.content),
            ("collaborative_weight", self.collaborative),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::invalid_input(
                    field,
                    format!("{} must be a finite, non-negative number", value),
                ));
            }
        }
        Ok(())
    }
}

/// Combine both score sets, drop `exclude`, rank, and keep the top `limit`.
pub fn combine(
    content_scores: &[ScoredBook],
    collaborative_scores: &[ScoredBook],
    weights: HybridWeights,
    exclude: &HashSet<BookId>,
    limit: usize,
) -> Result<Vec<ScoredBook>> {
    weights.validate()?;

    let mut joined: BTreeMap<BookId, Explanation> = BTreeMap::new();

    for scored in content_scores {
        let entry = joined.entry(scored.book_id).or_default();
        entry.content_score = scored.score;
        entry.matching_genres = scored.explanation.matching_genres.clone();
    }
    for scored in collaborative_scores {
        let entry = joined.entry(scored.book_id).or_default();
        entry.collaborative_score = scored.score;
        entry.endorsements = scored.explanation.endorsements.clone();
    }

    let mut ranked: Vec<ScoredBook> = joined
        .into_iter()
        .filter(|(book_id, _)| !exclude.contains(book_id))
        .map(|(book_id, explanation)| {
            let score = weights.content * explanation.content_score
                + weights.collaborative * explanation.collaborative_score;
            let source = match (
                explanation.content_score > 0.0,
                explanation.collaborative_score > 0.0,
            ) {
                (true, true) => ScoreSource::Hybrid,
                (false, true) => ScoreSource::Collaborative,
                _ => ScoreSource::Content,
            };
            ScoredBook {
                book_id,
                score,
                source,
                explanation,
            }
        })
        .collect();

    ranked.sort_by(compare_ranked);
    ranked.truncate(limit);

    Ok(ranked)
}

fn compare_ranked(a: &ScoredBook, b: &ScoredBook) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.explanation
                .collaborative_score
                .partial_cmp(&a.explanation.collaborative_score)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| {
            b.explanation
                .content_score
                .partial_cmp(&a.explanation.content_score)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.book_id.cmp(&b.book_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(book_id: BookId, score: f64, source: ScoreSource) -> ScoredBook {
        let mut explanation = Explanation::default();
        match source {
            ScoreSource::Collaborative => explanation.collaborative_score = score,
            _ => explanation.content_score = score,
        }
        ScoredBook {
            book_id,
            score,
            source,
            explanation,
        }
    }

    fn ids(list: &[ScoredBook]) -> Vec<BookId> {
        list.iter().map(|s| s.book_id).collect()
    }

    #[test]
    fn test_outer_join_and_weighting() {
        let content = vec![
            scored(1, 1.0, ScoreSource::Content),
            scored(2, 0.5, ScoreSource::Content),
        ];
        let collab = vec![
            scored(2, 1.0, ScoreSource::Collaborative),
            scored(3, 0.4, ScoreSource::Collaborative),
        ];

        let ranked = combine(
            &content,
            &collab,
            HybridWeights::new(0.6, 0.4),
            &HashSet::new(),
            10,
        )
        .unwrap();

        assert_eq!(ids(&ranked), vec![2, 1, 3]);
        assert!((ranked[0].score - 0.7).abs() < 1e-12);
        assert_eq!(ranked[0].source, ScoreSource::Hybrid);
        assert_eq!(ranked[1].source, ScoreSource::Content);
        assert_eq!(ranked[2].source, ScoreSource::Collaborative);
        assert!((ranked[2].score - 0.16).abs() < 1e-12);
    }

    #[test]
    fn test_empty_collaborative_keeps_content_order() {
        let content = vec![
            scored(4, 0.2, ScoreSource::Content),
            scored(1, 0.9, ScoreSource::Content),
            scored(3, 0.2, ScoreSource::Content),
            scored(2, 0.0, ScoreSource::Content),
        ];
        let ranked =
            combine(&content, &[], HybridWeights::default(), &HashSet::new(), 10).unwrap();
        assert_eq!(ids(&ranked), vec![1, 3, 4, 2]);
    }

    #[test]
    fn test_zero_content_weight_still_follows_content_order() {
        let content = vec![
            scored(1, 0.1, ScoreSource::Content),
            scored(2, 0.9, ScoreSource::Content),
            scored(3, 0.5, ScoreSource::Content),
        ];
        let ranked = combine(
            &content,
            &[],
            HybridWeights::new(0.0, 1.0),
            &HashSet::new(),
            10,
        )
        .unwrap();
        assert_eq!(ids(&ranked), vec![2, 3, 1]);
        assert!(ranked.iter().all(|s| s.score == 0.0));
    }

    #[test]
    fn test_zero_collaborative_weight_still_follows_collaborative_order() {
        let collab = vec![
            scored(8, 0.2, ScoreSource::Collaborative),
            scored(9, 1.4, ScoreSource::Collaborative),
        ];
        let ranked = combine(
            &[],
            &collab,
            HybridWeights::new(1.0, 0.0),
            &HashSet::new(),
            10,
        )
        .unwrap();
        assert_eq!(ids(&ranked), vec![9, 8]);
    }

    #[test]
    fn test_tie_breaks_prefer_collaborative_then_lower_id() {
        // Book 5: content only 0.5 -> combined 0.25
        // Book 7: collaborative only 0.5 -> combined 0.25
        // Book 6: content only 0.5 -> combined 0.25
        let content = vec![
            scored(5, 0.5, ScoreSource::Content),
            scored(6, 0.5, ScoreSource::Content),
        ];
        let collab = vec![scored(7, 0.5, ScoreSource::Collaborative)];
        let ranked =
            combine(&content, &collab, HybridWeights::default(), &HashSet::new(), 10).unwrap();
        assert_eq!(ids(&ranked), vec![7, 5, 6]);
    }

    #[test]
    fn test_exclusion_and_limit() {
        let content: Vec<ScoredBook> = (1..=10)
            .map(|i| scored(i, i as f64 / 10.0, ScoreSource::Content))
            .collect();
        let collab = vec![scored(10, 5.0, ScoreSource::Collaborative)];
        let exclude: HashSet<BookId> = [10, 9].into_iter().collect();

        let ranked = combine(&content, &collab, HybridWeights::default(), &exclude, 3).unwrap();
        assert_eq!(ids(&ranked), vec![8, 7, 6]);
        assert!(ranked.len() <= 3);
    }

    #[test]
    fn test_rejects_negative_or_nan_weights() {
        assert!(matches!(
            combine(&[], &[], HybridWeights::new(-0.1, 1.0), &HashSet::new(), 5),
            Err(Error::InvalidInput { field: "content_weight", .. })
        ));
        assert!(matches!(
            combine(&[], &[], HybridWeights::new(1.0, f64::NAN), &HashSet::new(), 5),
            Err(Error::InvalidInput { field: "collaborative_weight", .. })
        ));
    }
}
