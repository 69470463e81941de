/// Multi-objective slot mixing.
///
/// Allocates the final output across strategy categories using the quota
/// table configured for the request's learning objective. Selection is
/// greedy per category in ranked order; unused quota spills to the
/// next-highest-weighted category; the selected set is emitted in its
/// ranked order with a `HYBRID:<category>` source tag.
use std::collections::HashMap;

use codetop_config::{MixConfig, ProfilerConfig, QuotaTable};
use codetop_domain::LearningObjective;

use super::types::{ProblemCandidate, RankedItem};
use crate::profile::{tag_domain, UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyCategory {
    Weakness,
    Progressive,
    Coverage,
    Exam,
    Refresh,
}

impl StrategyCategory {
    pub fn label(&self) -> &'static str {
        match self {
            StrategyCategory::Weakness => "weakness",
            StrategyCategory::Progressive => "progressive",
            StrategyCategory::Coverage => "coverage",
            StrategyCategory::Exam => "exam",
            StrategyCategory::Refresh => "refresh",
        }
    }
}

const ALL_CATEGORIES: [StrategyCategory; 5] = [
    StrategyCategory::Weakness,
    StrategyCategory::Progressive,
    StrategyCategory::Coverage,
    StrategyCategory::Exam,
    StrategyCategory::Refresh,
];

/// Tags marking interview/exam-prep material.
const EXAM_TAGS: [&str; 3] = ["exam", "interview", "company"];

pub struct StrategyMixer {
    config: MixConfig,
    profiler: ProfilerConfig,
}

impl StrategyMixer {
    pub fn new(config: MixConfig, profiler: ProfilerConfig) -> Self {
        Self { config, profiler }
    }

    pub fn mix(
        &self,
        items: Vec<RankedItem>,
        candidates: &HashMap<i64, ProblemCandidate>,
        profile: &UserProfile,
        objective: LearningObjective,
        total_limit: usize,
    ) -> Vec<RankedItem> {
        if !self.config.enabled {
            return items
                .into_iter()
                .take(total_limit)
                .map(|mut item| {
                    item.source = "HYBRID".to_string();
                    item
                })
                .collect();
        }

        let quota = self.quota_for(objective);

        // Categorize every item, keeping ranked order inside each bucket.
        let mut buckets: HashMap<StrategyCategory, Vec<usize>> = HashMap::new();
        for (index, item) in items.iter().enumerate() {
            let category = candidates
                .get(&item.problem_id)
                .map(|candidate| self.categorize(candidate, profile))
                .unwrap_or(StrategyCategory::Coverage);
            buckets.entry(category).or_default().push(index);
        }

        // Categories by descending quota weight; ties break on the fixed
        // declaration order so output is deterministic.
        let mut by_weight: Vec<(StrategyCategory, f64)> = ALL_CATEGORIES
            .iter()
            .map(|c| (*c, quota_of(&quota, *c)))
            .collect();
        by_weight.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut selected: Vec<(usize, StrategyCategory)> = Vec::with_capacity(total_limit);

        // First pass: each category takes up to its quota share.
        for (category, weight) in &by_weight {
            let slots = (weight * total_limit as f64).round() as usize;
            take_from_bucket(&mut buckets, *category, slots, &mut selected);
            if selected.len() >= total_limit {
                break;
            }
        }

        // Spill: remaining capacity drains categories in weight order.
        if selected.len() < total_limit {
            for (category, _) in &by_weight {
                let remaining = total_limit - selected.len();
                if remaining == 0 {
                    break;
                }
                take_from_bucket(&mut buckets, *category, remaining, &mut selected);
            }
        }

        // Emit in the ranked order the hybrid stage produced.
        selected.sort_by_key(|(index, _)| *index);
        selected
            .into_iter()
            .take(total_limit)
            .map(|(index, category)| {
                let mut item = items[index].clone();
                item.source = format!("HYBRID:{}", category.label());
                item
            })
            .collect()
    }

    fn quota_for(&self, objective: LearningObjective) -> QuotaTable {
        let key = match objective {
            LearningObjective::WeaknessFocus => "WEAKNESS_FOCUS",
            LearningObjective::ProgressiveDifficulty => "PROGRESSIVE_DIFFICULTY",
            LearningObjective::TopicCoverage => "TOPIC_COVERAGE",
            LearningObjective::ExamPrep => "EXAM_PREP",
            LearningObjective::RefreshMastered => "REFRESH_MASTERED",
        };
        self.config.quotas.get(key).copied().unwrap_or_default()
    }

    /// First matching category in fixed precedence order; uncategorized
    /// items count toward coverage.
    fn categorize(&self, candidate: &ProblemCandidate, profile: &UserProfile) -> StrategyCategory {
        let weak = profile.weak_domains();
        let strong = profile.strong_domains();

        let dominant_domain = candidate
            .tags
            .iter()
            .find_map(|tag| tag_domain(&self.profiler, tag));

        if let Some(domain) = dominant_domain {
            if weak.contains(domain) {
                return StrategyCategory::Weakness;
            }
        }

        let current_level = profile.difficulty_preference.preferred_level.level();
        if candidate.difficulty.level() == current_level + 1 {
            return StrategyCategory::Progressive;
        }

        // Coverage: the problem's domains are unknown or thin in the profile.
        let introduces_new_domain = candidate.tags.iter().any(|tag| {
            tag_domain(&self.profiler, tag)
                .map(|domain| match profile.domain_skills.get(domain) {
                    Some(skill) => skill.samples < self.profiler.min_samples_for_reliability,
                    None => true,
                })
                .unwrap_or(false)
        });
        if introduces_new_domain {
            return StrategyCategory::Coverage;
        }

        if candidate
            .tags
            .iter()
            .any(|tag| EXAM_TAGS.iter().any(|e| tag.contains(e)))
        {
            return StrategyCategory::Exam;
        }

        if let Some(domain) = dominant_domain {
            if strong.contains(domain) {
                return StrategyCategory::Refresh;
            }
        }

        StrategyCategory::Coverage
    }
}

fn quota_of(table: &QuotaTable, category: StrategyCategory) -> f64 {
    match category {
        StrategyCategory::Weakness => table.weakness,
        StrategyCategory::Progressive => table.progressive,
        StrategyCategory::Coverage => table.coverage,
        StrategyCategory::Exam => table.exam,
        StrategyCategory::Refresh => table.refresh,
    }
}

fn take_from_bucket(
    buckets: &mut HashMap<StrategyCategory, Vec<usize>>,
    category: StrategyCategory,
    count: usize,
    selected: &mut Vec<(usize, StrategyCategory)>,
) {
    if count == 0 {
        return;
    }
    if let Some(bucket) = buckets.get_mut(&category) {
        let take = count.min(bucket.len());
        for index in bucket.drain(..take) {
            selected.push((index, category));
        }
    }
}
