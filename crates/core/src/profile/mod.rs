/// User profiling from recent review history.
///
/// Derives per-domain skill, difficulty preference, tag affinity, and an
/// overall learning pattern from the review window. Everything here is a
/// pure function of (logs, problems, config, now); the service layer owns
/// fetching and caching.
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use codetop_config::ProfilerConfig;
use codetop_domain::{Problem, ProblemDifficulty, ReviewLog};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fsrs::FsrsEngine;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkillStrength {
    Weak,
    Normal,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Increasing,
    Stable,
    Decreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LearningPattern {
    Struggling,
    SteadyProgress,
    Advanced,
}

/// Aggregated skill for one knowledge domain (e.g. `dynamic_programming`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSkill {
    /// Review-log samples contributing to this domain.
    pub samples: usize,
    /// Distinct problems attempted in this domain.
    pub attempts: usize,
    pub accuracy: f64,
    /// Mean modeled retrievability at review time.
    pub retention: f64,
    pub lapse_rate: f64,
    /// Composite score in [0, 1].
    pub skill_score: f64,
    pub strength: SkillStrength,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyPreference {
    /// Review-share per difficulty; sums to ~1 when any reviews exist.
    pub easy: f64,
    pub medium: f64,
    pub hard: f64,
    pub trend: TrendDirection,
    pub preferred_level: ProblemDifficulty,
}

impl Default for DifficultyPreference {
    fn default() -> Self {
        Self {
            easy: 0.0,
            medium: 0.0,
            hard: 0.0,
            trend: TrendDirection::Stable,
            preferred_level: ProblemDifficulty::Easy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: Uuid,
    pub domain_skills: HashMap<String, DomainSkill>,
    pub difficulty_preference: DifficultyPreference,
    /// Tag → normalized review frequency in [0, 1].
    pub tag_affinity: HashMap<String, f64>,
    pub overall_mastery: f64,
    pub total_problems_reviewed: usize,
    pub pattern: LearningPattern,
    pub generated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Empty profile for a user with no reviews in the window.
    pub fn empty(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            domain_skills: HashMap::new(),
            difficulty_preference: DifficultyPreference::default(),
            tag_affinity: HashMap::new(),
            overall_mastery: 0.0,
            total_problems_reviewed: 0,
            pattern: LearningPattern::SteadyProgress,
            generated_at: now,
        }
    }

    pub fn weak_domains(&self) -> HashSet<&str> {
        self.domain_skills
            .iter()
            .filter(|(_, skill)| skill.strength == SkillStrength::Weak)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn strong_domains(&self) -> HashSet<&str> {
        self.domain_skills
            .iter()
            .filter(|(_, skill)| skill.strength == SkillStrength::Strong)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Domains sampled less than the reliability floor; candidates for the
    /// coverage mixing category.
    pub fn undersampled_domains(&self, floor: usize) -> HashSet<&str> {
        self.domain_skills
            .iter()
            .filter(|(_, skill)| skill.samples < floor)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Resolve a tag into its knowledge domain. Unknown tags land in `other`.
pub fn tag_domain<'a>(config: &'a ProfilerConfig, tag: &str) -> Option<&'a str> {
    config.tag_domains.get(tag).map(|s| s.as_str())
}

// ============================================================================
// PROFILER
// ============================================================================

pub struct UserProfiler {
    config: ProfilerConfig,
}

impl UserProfiler {
    pub fn new(config: ProfilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Build a profile from the review window.
    ///
    /// `problems` must contain the metadata for every problem id appearing
    /// in `logs`; logs with missing metadata are skipped.
    pub fn build(
        &self,
        user_id: Uuid,
        logs: &[ReviewLog],
        problems: &HashMap<i64, Problem>,
        now: DateTime<Utc>,
    ) -> UserProfile {
        if logs.is_empty() {
            return UserProfile::empty(user_id, now);
        }

        // Chronological order so the trend split is stable.
        let mut ordered: Vec<&ReviewLog> = logs
            .iter()
            .filter(|log| problems.contains_key(&log.problem_id))
            .collect();
        ordered.sort_by_key(|log| log.reviewed_at);

        if ordered.is_empty() {
            return UserProfile::empty(user_id, now);
        }

        let domain_skills = self.domain_skills(&ordered, problems);
        let difficulty_preference = difficulty_preference(&ordered, problems);
        let tag_affinity = tag_affinity(&ordered, problems);

        let distinct_problems: HashSet<i64> =
            ordered.iter().map(|log| log.problem_id).collect();

        let overall_mastery = weighted_mastery(&domain_skills);
        let overall_accuracy = {
            let successes = ordered.iter().filter(|log| log.rating >= 3).count();
            successes as f64 / ordered.len() as f64
        };
        let pattern = classify_pattern(overall_mastery, overall_accuracy);

        UserProfile {
            user_id,
            domain_skills,
            difficulty_preference,
            tag_affinity,
            overall_mastery,
            total_problems_reviewed: distinct_problems.len(),
            pattern,
            generated_at: now,
        }
    }

    fn domain_skills(
        &self,
        logs: &[&ReviewLog],
        problems: &HashMap<i64, Problem>,
    ) -> HashMap<String, DomainSkill> {
        struct Accumulator {
            samples: usize,
            successes: usize,
            lapses: usize,
            retention_sum: f64,
            problems: HashSet<i64>,
        }

        let mut acc: HashMap<String, Accumulator> = HashMap::new();
        for log in logs {
            let Some(problem) = problems.get(&log.problem_id) else {
                continue;
            };
            let retention =
                FsrsEngine::retrievability(log.elapsed_days, log.old_stability);

            let mut domains: HashSet<&str> = HashSet::new();
            for tag in &problem.tags {
                if let Some(domain) = tag_domain(&self.config, tag) {
                    domains.insert(domain);
                }
            }
            // Unknown tags fall into `other` and do not count.

            for domain in domains {
                let entry = acc.entry(domain.to_string()).or_insert(Accumulator {
                    samples: 0,
                    successes: 0,
                    lapses: 0,
                    retention_sum: 0.0,
                    problems: HashSet::new(),
                });
                entry.samples += 1;
                entry.retention_sum += retention;
                entry.problems.insert(log.problem_id);
                if log.rating >= 3 {
                    entry.successes += 1;
                }
                if log.rating == 1 {
                    entry.lapses += 1;
                }
            }
        }

        acc.into_iter()
            .map(|(domain, a)| {
                let samples = a.samples as f64;
                let accuracy = a.successes as f64 / samples;
                let smoothed = (a.successes as f64 + self.config.alpha)
                    / (samples + self.config.alpha + self.config.beta);
                let retention = a.retention_sum / samples;
                let lapse_rate = a.lapses as f64 / samples;
                let skill_score = (0.6 * smoothed + 0.25 * retention
                    + 0.15 * (1.0 - lapse_rate))
                    .clamp(0.0, 1.0);

                let reliable = a.samples >= self.config.min_samples_for_reliability;
                let strength = if reliable && skill_score < self.config.weak_skill_threshold {
                    SkillStrength::Weak
                } else if reliable && skill_score > self.config.strong_skill_threshold {
                    SkillStrength::Strong
                } else {
                    SkillStrength::Normal
                };

                (
                    domain,
                    DomainSkill {
                        samples: a.samples,
                        attempts: a.problems.len(),
                        accuracy,
                        retention,
                        lapse_rate,
                        skill_score,
                        strength,
                    },
                )
            })
            .collect()
    }
}

fn difficulty_preference(
    logs: &[&ReviewLog],
    problems: &HashMap<i64, Problem>,
) -> DifficultyPreference {
    let mut counts = [0usize; 3];
    let mut levels: Vec<f64> = Vec::with_capacity(logs.len());
    for log in logs {
        if let Some(problem) = problems.get(&log.problem_id) {
            counts[problem.difficulty.level() as usize - 1] += 1;
            levels.push(problem.difficulty.level() as f64);
        }
    }
    let total: usize = counts.iter().sum();
    if total == 0 {
        return DifficultyPreference::default();
    }

    let easy = counts[0] as f64 / total as f64;
    let medium = counts[1] as f64 / total as f64;
    let hard = counts[2] as f64 / total as f64;

    // Trend: mean attempted level of the recent half vs the earlier half.
    let trend = if levels.len() < 4 {
        TrendDirection::Stable
    } else {
        let mid = levels.len() / 2;
        let early: f64 = levels[..mid].iter().sum::<f64>() / mid as f64;
        let late: f64 = levels[mid..].iter().sum::<f64>() / (levels.len() - mid) as f64;
        if late - early > 0.15 {
            TrendDirection::Increasing
        } else if early - late > 0.15 {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    };

    let preferred_level = if hard >= medium && hard >= easy {
        ProblemDifficulty::Hard
    } else if medium >= easy {
        ProblemDifficulty::Medium
    } else {
        ProblemDifficulty::Easy
    };

    DifficultyPreference {
        easy,
        medium,
        hard,
        trend,
        preferred_level,
    }
}

fn tag_affinity(logs: &[&ReviewLog], problems: &HashMap<i64, Problem>) -> HashMap<String, f64> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for log in logs {
        if let Some(problem) = problems.get(&log.problem_id) {
            for tag in &problem.tags {
                *counts.entry(tag.clone()).or_default() += 1;
            }
        }
    }
    let max = counts.values().copied().max().unwrap_or(0);
    if max == 0 {
        return HashMap::new();
    }
    counts
        .into_iter()
        .map(|(tag, count)| (tag, count as f64 / max as f64))
        .collect()
}

fn weighted_mastery(skills: &HashMap<String, DomainSkill>) -> f64 {
    let total: usize = skills.values().map(|s| s.samples).sum();
    if total == 0 {
        return 0.0;
    }
    let weighted: f64 = skills
        .values()
        .map(|s| s.skill_score * s.samples as f64)
        .sum();
    (weighted / total as f64).clamp(0.0, 1.0)
}

fn classify_pattern(mastery: f64, accuracy: f64) -> LearningPattern {
    if mastery > 0.7 && accuracy > 0.8 {
        LearningPattern::Advanced
    } else if mastery < 0.4 || accuracy < 0.55 {
        LearningPattern::Struggling
    } else {
        LearningPattern::SteadyProgress
    }
}
