/// Hybrid re-ranking: blends the model's score with scheduler urgency,
/// content similarity to mastered problems, and personalization fit.
use std::collections::HashMap;

use codetop_config::{HybridWeights, ProfilerConfig};

use super::types::{ProblemCandidate, RankedItem};
use crate::profile::{tag_domain, UserProfile};

pub struct HybridRanker {
    weights: HybridWeights,
    profiler: ProfilerConfig,
}

impl HybridRanker {
    pub fn new(weights: HybridWeights, profiler: ProfilerConfig) -> Self {
        Self { weights, profiler }
    }

    /// Recompute each item's score as the configured linear blend and sort
    /// descending. The sort is stable, so equal scores keep their original
    /// (model-ranked) order. Disabled configuration passes items through.
    pub fn rank(
        &self,
        mut items: Vec<RankedItem>,
        candidates: &HashMap<i64, ProblemCandidate>,
        profile: &UserProfile,
        mastered_tag_sets: &[Vec<String>],
    ) -> Vec<RankedItem> {
        if !self.weights.enabled {
            return items;
        }

        for item in &mut items {
            let candidate = candidates.get(&item.problem_id);
            let urgency = candidate.map(|c| c.urgency_score).unwrap_or(0.0);
            let tags: &[String] = candidate.map(|c| c.tags.as_slice()).unwrap_or(&[]);

            let similarity = similarity_boost(tags, mastered_tag_sets);
            let personalization = self.personalization_boost(tags, profile);

            item.score = (self.weights.llm * item.score.clamp(0.0, 1.0)
                + self.weights.fsrs * urgency
                + self.weights.similarity * similarity
                + self.weights.personalization * personalization)
                .clamp(0.0, 1.0);
        }

        items.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        items
    }

    /// +1 per weak-domain tag, −1 per strong-domain tag, averaged over the
    /// item's tags and mapped into [0, 1].
    fn personalization_boost(&self, tags: &[String], profile: &UserProfile) -> f64 {
        if tags.is_empty() {
            return 0.5;
        }
        let weak = profile.weak_domains();
        let strong = profile.strong_domains();

        let mut raw = 0.0;
        for tag in tags {
            if let Some(domain) = tag_domain(&self.profiler, tag) {
                if weak.contains(domain) {
                    raw += 1.0;
                } else if strong.contains(domain) {
                    raw -= 1.0;
                }
            }
        }
        ((raw / tags.len() as f64) + 1.0) / 2.0
    }
}

/// Mean Jaccard similarity between the item's tags and each mastered
/// problem's tags, bounded to [0, 1].
fn similarity_boost(tags: &[String], mastered_tag_sets: &[Vec<String>]) -> f64 {
    if tags.is_empty() || mastered_tag_sets.is_empty() {
        return 0.0;
    }
    let total: f64 = mastered_tag_sets
        .iter()
        .map(|mastered| jaccard(tags, mastered))
        .sum();
    (total / mastered_tag_sets.len() as f64).clamp(0.0, 1.0)
}

fn jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let set_a: std::collections::HashSet<&String> = a.iter().collect();
    let set_b: std::collections::HashSet<&String> = b.iter().collect();
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use codetop_domain::ProblemDifficulty;
    use uuid::Uuid;

    fn item(problem_id: i64, score: f64) -> RankedItem {
        RankedItem {
            problem_id,
            score,
            reason: "r".to_string(),
            source: "LLM".to_string(),
            confidence: 0.0,
            model: None,
        }
    }

    fn candidate(id: i64, urgency: f64, tags: &[&str]) -> (i64, ProblemCandidate) {
        (
            id,
            ProblemCandidate {
                id,
                topic: "t".to_string(),
                difficulty: ProblemDifficulty::Medium,
                tags: tags.iter().map(|t| t.to_string()).collect(),
                attempts: 3,
                recent_accuracy: 0.5,
                urgency_score: urgency,
                retention_probability: 0.7,
                days_overdue: 1.0,
            },
        )
    }

    fn ranker() -> HybridRanker {
        HybridRanker::new(HybridWeights::default(), ProfilerConfig::default())
    }

    #[test]
    fn test_jaccard() {
        let a = vec!["array".to_string(), "two-pointers".to_string()];
        let b = vec!["array".to_string(), "sorting".to_string()];
        assert!((jaccard(&a, &b) - (1.0 / 3.0)).abs() < 1e-9);
        assert_eq!(jaccard(&a, &a), 1.0);
        assert_eq!(jaccard(&a, &[]), 0.0);
    }

    #[test]
    fn test_disabled_ranker_passes_through() {
        let mut weights = HybridWeights::default();
        weights.enabled = false;
        let ranker = HybridRanker::new(weights, ProfilerConfig::default());

        let items = vec![item(1, 0.1), item(2, 0.9)];
        let ranked = ranker.rank(
            items.clone(),
            &HashMap::new(),
            &UserProfile::empty(Uuid::nil(), Utc::now()),
            &[],
        );
        assert_eq!(ranked, items, "order and scores untouched");
    }

    #[test]
    fn test_urgency_lifts_low_model_scores() {
        let candidates: HashMap<i64, ProblemCandidate> =
            [candidate(1, 1.0, &["array"]), candidate(2, 0.0, &["array"])]
                .into_iter()
                .collect();
        let profile = UserProfile::empty(Uuid::nil(), Utc::now());

        // Model slightly prefers 2; urgency strongly prefers 1.
        let ranked = ranker().rank(
            vec![item(2, 0.55), item(1, 0.45)],
            &candidates,
            &profile,
            &[],
        );
        assert_eq!(ranked[0].problem_id, 1);
    }

    #[test]
    fn test_stable_order_for_equal_blends() {
        let candidates: HashMap<i64, ProblemCandidate> =
            [candidate(1, 0.5, &[]), candidate(2, 0.5, &[])]
                .into_iter()
                .collect();
        let profile = UserProfile::empty(Uuid::nil(), Utc::now());

        let ranked = ranker().rank(
            vec![item(2, 0.5), item(1, 0.5)],
            &candidates,
            &profile,
            &[],
        );
        // Identical features: original model order preserved.
        assert_eq!(ranked[0].problem_id, 2);
    }

    #[test]
    fn test_similarity_rewards_overlap_with_mastered() {
        let candidates: HashMap<i64, ProblemCandidate> = [
            candidate(1, 0.5, &["array", "two-pointers"]),
            candidate(2, 0.5, &["graph"]),
        ]
        .into_iter()
        .collect();
        let profile = UserProfile::empty(Uuid::nil(), Utc::now());
        let mastered = vec![vec!["array".to_string(), "two-pointers".to_string()]];

        let ranked = ranker().rank(
            vec![item(1, 0.5), item(2, 0.5)],
            &candidates,
            &profile,
            &mastered,
        );
        assert_eq!(ranked[0].problem_id, 1);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_scores_bounded() {
        let candidates: HashMap<i64, ProblemCandidate> =
            [candidate(1, 1.0, &["array"])].into_iter().collect();
        let profile = UserProfile::empty(Uuid::nil(), Utc::now());
        let mastered = vec![vec!["array".to_string()]];

        let ranked = ranker().rank(vec![item(1, 1.0)], &candidates, &profile, &mastered);
        assert!(ranked[0].score <= 1.0);
        assert!(ranked[0].score >= 0.0);
    }
}
