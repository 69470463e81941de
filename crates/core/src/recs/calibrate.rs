/// Confidence calibration over six signals.
///
/// Signal weights are validated to sum to 1 at config load, so the blended
/// confidence stays in [0, 1]. Items below the minimum-show floor are
/// dropped; optionally the label is prepended to the item's reason.
use std::collections::HashMap;

use codetop_config::ConfidenceConfig;

use super::types::{ProblemCandidate, RankedItem};
use crate::profile::UserProfile;

/// Review depth at which the FSRS-data signal saturates.
const FSRS_DEPTH_SATURATION: f64 = 10.0;
/// Profile size at which the context-quality signal saturates.
const CONTEXT_SATURATION: f64 = 50.0;

pub struct ConfidenceCalibrator {
    config: ConfidenceConfig,
}

impl ConfidenceCalibrator {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn calibrate(
        &self,
        items: Vec<RankedItem>,
        candidates: &HashMap<i64, ProblemCandidate>,
        profile: &UserProfile,
    ) -> Vec<RankedItem> {
        if !self.config.enabled {
            return items;
        }

        items
            .into_iter()
            .filter_map(|mut item| {
                let confidence = self.confidence(&item, candidates.get(&item.problem_id), profile);
                item.confidence = confidence;

                if confidence < self.config.minimum_show {
                    return None;
                }
                if self.config.include_in_reason {
                    item.reason =
                        format!("[{} Confidence] {}", self.classify(confidence), item.reason);
                }
                Some(item)
            })
            .collect()
    }

    pub fn classify(&self, confidence: f64) -> &'static str {
        if confidence >= self.config.high_threshold {
            "High"
        } else if confidence >= self.config.medium_threshold {
            "Medium"
        } else if confidence >= self.config.low_threshold {
            "Low"
        } else {
            "Very Low"
        }
    }

    fn confidence(
        &self,
        item: &RankedItem,
        candidate: Option<&ProblemCandidate>,
        profile: &UserProfile,
    ) -> f64 {
        let weights = &self.config.weights;

        // Model-originated items carry their score as a quality proxy;
        // scheduler fallback items get a fixed midpoint.
        let llm_quality = if item.model.is_some() {
            item.score.clamp(0.0, 1.0)
        } else {
            0.4
        };

        let fsrs_depth = candidate
            .map(|c| (c.attempts as f64 / FSRS_DEPTH_SATURATION).min(1.0))
            .unwrap_or(0.0);

        let profile_relevance = candidate
            .map(|c| known_domain_share(c, profile))
            .unwrap_or(0.0);

        let historical_accuracy = candidate.map(|c| c.recent_accuracy).unwrap_or(0.0);

        // Agreement between the model score and the scheduler's urgency.
        let consensus = candidate
            .map(|c| 1.0 - (item.score - c.urgency_score).abs())
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);

        let context_quality =
            (profile.total_problems_reviewed as f64 / CONTEXT_SATURATION).min(1.0);

        (weights.llm_quality * llm_quality
            + weights.fsrs_depth * fsrs_depth
            + weights.profile_relevance * profile_relevance
            + weights.historical_accuracy * historical_accuracy
            + weights.consensus * consensus
            + weights.context_quality * context_quality)
            .clamp(0.0, 1.0)
    }
}

/// Share of the candidate's tags whose domain the profile has data for.
fn known_domain_share(candidate: &ProblemCandidate, profile: &UserProfile) -> f64 {
    if candidate.tags.is_empty() {
        return 0.0;
    }
    // Domain names are values of the tag mapping; the profile keys on them.
    let known = candidate
        .tags
        .iter()
        .filter(|tag| {
            profile
                .domain_skills
                .keys()
                .any(|domain| domain == *tag || tag.replace('-', "_").contains(domain.as_str()))
        })
        .count();
    known as f64 / candidate.tags.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use codetop_domain::ProblemDifficulty;
    use uuid::Uuid;

    fn item(problem_id: i64, score: f64, model: Option<&str>) -> RankedItem {
        RankedItem {
            problem_id,
            score,
            reason: "Solve it".to_string(),
            source: "HYBRID:weakness".to_string(),
            confidence: 0.0,
            model: model.map(str::to_string),
        }
    }

    fn candidate(id: i64, attempts: i32, accuracy: f64, urgency: f64) -> ProblemCandidate {
        ProblemCandidate {
            id,
            topic: "arrays".to_string(),
            difficulty: ProblemDifficulty::Medium,
            tags: vec!["array".to_string()],
            attempts,
            recent_accuracy: accuracy,
            urgency_score: urgency,
            retention_probability: 0.7,
            days_overdue: 0.0,
        }
    }

    fn profile() -> UserProfile {
        let mut profile = UserProfile::empty(Uuid::nil(), Utc::now());
        profile.total_problems_reviewed = 50;
        profile
    }

    fn calibrator() -> ConfidenceCalibrator {
        ConfidenceCalibrator::new(ConfidenceConfig::default())
    }

    #[test]
    fn test_disabled_returns_inputs_unchanged() {
        let mut config = ConfidenceConfig::default();
        config.enabled = false;
        let calibrator = ConfidenceCalibrator::new(config);

        let items = vec![item(1, 0.9, Some("m"))];
        let out = calibrator.calibrate(items.clone(), &HashMap::new(), &profile());
        assert_eq!(out, items);
    }

    #[test]
    fn test_labels_follow_thresholds() {
        let calibrator = calibrator();
        assert_eq!(calibrator.classify(0.8), "High");
        assert_eq!(calibrator.classify(0.6), "Medium");
        assert_eq!(calibrator.classify(0.35), "Low");
        assert_eq!(calibrator.classify(0.1), "Very Low");
    }

    #[test]
    fn test_reason_prefixed_with_label() {
        let candidates: HashMap<i64, ProblemCandidate> =
            [(1, candidate(1, 10, 0.9, 0.9))].into_iter().collect();
        let out = calibrator().calibrate(vec![item(1, 0.9, Some("m"))], &candidates, &profile());
        assert_eq!(out.len(), 1);
        assert!(
            out[0].reason.starts_with('['),
            "reason should carry the confidence label: {}",
            out[0].reason
        );
        assert!(out[0].reason.ends_with("Solve it"));
    }

    #[test]
    fn test_low_confidence_items_dropped() {
        // No candidate data, no model, empty profile: everything near zero.
        let empty_profile = UserProfile::empty(Uuid::nil(), Utc::now());
        let out = calibrator().calibrate(
            vec![item(1, 0.0, None)],
            &HashMap::new(),
            &empty_profile,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_rich_signals_score_high() {
        let candidates: HashMap<i64, ProblemCandidate> =
            [(1, candidate(1, 10, 0.9, 0.85))].into_iter().collect();
        let out = calibrator().calibrate(vec![item(1, 0.85, Some("m"))], &candidates, &profile());
        assert_eq!(out.len(), 1);
        assert!(out[0].confidence > 0.6, "got {}", out[0].confidence);
    }

    #[test]
    fn test_confidence_bounded() {
        let candidates: HashMap<i64, ProblemCandidate> =
            [(1, candidate(1, 100, 1.0, 1.0))].into_iter().collect();
        let out = calibrator().calibrate(vec![item(1, 1.0, Some("m"))], &candidates, &profile());
        assert!(out[0].confidence <= 1.0);
    }
}
