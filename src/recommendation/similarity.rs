//! Neighbor selection
//!
//! Ranks other readers by the Jaccard overlap of their genre interests with
//! the target reader's. The selected neighbors feed collaborative scoring.

use std::cmp::Ordering;

use crate::error::{Error, Result};

use super::genres::jaccard;
use super::model::{User, UserSimilarity};

/// Find readers whose interests overlap the target's.
///
/// 1. Skip the target itself and candidates without interests
/// 2. Drop anyone strictly below `min_similarity` (no "best available" fallback)
/// 3. Sort by similarity descending, ties by ascending user id
/// 4. Truncate to `max_results`
pub fn find_similar_users(
    target: &User,
    candidate_pool: &[User],
    min_similarity: f64,
    max_results: usize,
) -> Result<Vec<UserSimilarity>> {
    if !min_similarity.is_finite() || !(0.0..=1.0).contains(&min_similarity) {
        return Err(Error::invalid_input(
            "min_similarity",
            format!("{} is outside [0, 1]", min_similarity),
        ));
    }

    if target.interests.is_empty() {
        return Ok(Vec::new());
    }

    let mut similar: Vec<UserSimilarity> = candidate_pool
        .iter()
        .filter(|candidate| candidate.id != target.id && !candidate.interests.is_empty())
        .filter_map(|candidate| {
            let similarity = jaccard(&target.interests, &candidate.interests);
            if similarity < min_similarity {
                return None;
            }
            Some(UserSimilarity {
                user_id: candidate.id,
                similarity,
                common_interests: target
                    .interests
                    .intersection(&candidate.interests)
                    .map(str::to_string)
                    .collect(),
            })
        })
        .collect();

    similar.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    similar.truncate(max_results);

    Ok(similar)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Vec<User> {
        vec![
            User::new(1, ["fantasy", "mystery"]),
            User::new(5, ["fantasy", "mystery"]),
            User::new(3, ["fantasy", "mystery"]),
            User::new(4, ["fantasy", "romance"]),
            User::new(2, ["horror"]),
            User::new(6, Vec::<String>::new()),
        ]
    }

    #[test]
    fn test_excludes_target_and_sorts_with_id_tie_break() {
        let target = User::new(1, ["Fantasy", "Mystery"]);
        let result = find_similar_users(&target, &pool(), 0.1, 10).unwrap();

        let ids: Vec<i64> = result.iter().map(|s| s.user_id).collect();
        assert_eq!(ids, vec![3, 5, 4]);
        assert_eq!(result[0].similarity, 1.0);
        assert!((result[2].similarity - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(result[2].common_interests, vec!["fantasy"]);
        assert!(result.iter().all(|s| s.user_id != target.id));
    }

    #[test]
    fn test_threshold_is_applied_before_truncation() {
        let target = User::new(1, ["fantasy", "mystery"]);
        let result = find_similar_users(&target, &pool(), 0.5, 10).unwrap();
        assert!(result.iter().all(|s| s.similarity >= 0.5));
        assert_eq!(result.len(), 2);

        let truncated = find_similar_users(&target, &pool(), 0.1, 2).unwrap();
        assert_eq!(
            truncated.iter().map(|s| s.user_id).collect::<Vec<_>>(),
            vec![3, 5]
        );
    }

    #[test]
    fn test_no_fallback_when_only_candidate_is_below_threshold() {
        // jaccard({a,b,c,d}, {a,b,e}) = 2/5 = 0.4
        let target = User::new(1, ["a", "b", "c", "d"]);
        let only = vec![User::new(2, ["a", "b", "e"])];
        let result = find_similar_users(&target, &only, 0.5, 10).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_target_without_interests_has_no_neighbors() {
        let target = User::new(9, Vec::<String>::new());
        assert!(find_similar_users(&target, &pool(), 0.0, 10).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let target = User::new(1, ["fantasy"]);
        assert!(matches!(
            find_similar_users(&target, &pool(), -0.1, 10),
            Err(Error::InvalidInput { field: "min_similarity", .. })
        ));
        assert!(find_similar_users(&target, &pool(), f64::NAN, 10).is_err());
        assert!(find_similar_users(&target, &pool(), 1.5, 10).is_err());
    }

    #[test]
    fn test_zero_max_results() {
        let target = User::new(1, ["fantasy", "mystery"]);
        assert!(find_similar_users(&target, &pool(), 0.1, 0).unwrap().is_empty());
    }
}
