/// Candidate pool assembly for the recommendation pipeline.
///
/// Reuses the scheduler queue to pick urgent/overdue/new material, then
/// enriches each entry with per-card analytics. The pool is deliberately
/// larger than the final limit so the re-ranker has room to move items.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use codetop_config::{CandidateConfig, QueueConfig};
use codetop_domain::{Card, CardState, Problem};
use uuid::Uuid;

use super::types::ProblemCandidate;
use crate::fsrs::{assemble_queue, FsrsEngine};
use crate::ports::{CardRepository, ProblemRepository, ReviewLogRepository};

/// Baseline urgency for problems the user has never attempted. Below any
/// meaningfully overdue review, above fully-retained material.
const NEW_PROBLEM_URGENCY: f64 = 0.25;
/// Days-overdue saturation point for the urgency blend.
const OVERDUE_SATURATION_DAYS: f64 = 30.0;
/// Window for the per-problem recent-accuracy feature.
const ACCURACY_WINDOW_DAYS: i64 = 90;
const ACCURACY_WINDOW_LOGS: u32 = 500;

pub struct CandidateBuilder {
    cards: Arc<dyn CardRepository>,
    problems: Arc<dyn ProblemRepository>,
    logs: Arc<dyn ReviewLogRepository>,
    config: CandidateConfig,
    queue_config: QueueConfig,
}

impl CandidateBuilder {
    pub fn new(
        cards: Arc<dyn CardRepository>,
        problems: Arc<dyn ProblemRepository>,
        logs: Arc<dyn ReviewLogRepository>,
        config: CandidateConfig,
        queue_config: QueueConfig,
    ) -> Self {
        Self {
            cards,
            problems,
            logs,
            config,
            queue_config,
        }
    }

    /// Pool size for a requested output limit.
    pub fn pool_size(&self, limit: usize) -> usize {
        (limit * self.config.pool_multiplier)
            .min(self.config.pool_cap)
            .max(limit)
    }

    pub async fn build(
        &self,
        user_id: Uuid,
        limit: usize,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<ProblemCandidate>> {
        let pool = self.pool_size(limit);

        let learning_due = self
            .cards
            .list_due(
                user_id,
                &[CardState::Learning, CardState::Relearning],
                now,
                pool as u32,
            )
            .await?;
        let review_due = self
            .cards
            .list_due(user_id, &[CardState::Review], now, pool as u32)
            .await?;
        let fresh = self.problems.list_unseen(user_id, pool as u32).await?;

        let queue = assemble_queue(learning_due, review_due, fresh, pool, &self.queue_config);

        // Problem metadata for every card-backed entry.
        let card_problem_ids: Vec<i64> = queue
            .learning
            .iter()
            .chain(queue.review.iter())
            .map(|card| card.problem_id)
            .collect();
        let metadata: HashMap<i64, Problem> = self
            .problems
            .get_many(&card_problem_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let accuracy = self.recent_accuracy(user_id, now).await?;

        let mut candidates = Vec::with_capacity(queue.total());
        for card in queue.learning.iter().chain(queue.review.iter()) {
            let Some(problem) = metadata.get(&card.problem_id) else {
                continue; // soft-deleted since queue assembly
            };
            let recent = accuracy.get(&card.problem_id).copied().unwrap_or(0.0);
            candidates.push(candidate_from_card(card, problem, recent, now));
        }
        for problem in &queue.fresh {
            candidates.push(candidate_from_problem(problem));
        }

        Ok(candidates)
    }

    /// Per-problem success ratio over the recent review window.
    async fn recent_accuracy(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> anyhow::Result<HashMap<i64, f64>> {
        let since = now - chrono::Duration::days(ACCURACY_WINDOW_DAYS);
        let logs = self
            .logs
            .list_recent(user_id, since, ACCURACY_WINDOW_LOGS)
            .await?;

        let mut totals: HashMap<i64, (u32, u32)> = HashMap::new();
        for log in &logs {
            let entry = totals.entry(log.problem_id).or_default();
            entry.0 += 1;
            if log.rating >= 3 {
                entry.1 += 1;
            }
        }
        Ok(totals
            .into_iter()
            .map(|(id, (total, ok))| (id, ok as f64 / total as f64))
            .collect())
    }
}

/// Candidate features for an existing card.
pub fn candidate_from_card(
    card: &Card,
    problem: &Problem,
    recent_accuracy: f64,
    now: DateTime<Utc>,
) -> ProblemCandidate {
    let days_overdue = card
        .next_review
        .map(|due| ((now - due).num_seconds().max(0) as f64) / 86_400.0)
        .unwrap_or(0.0);
    let elapsed = card
        .last_review
        .map(|last| ((now - last).num_seconds().max(0) as f64) / 86_400.0)
        .unwrap_or(0.0);
    let retention = FsrsEngine::retrievability(elapsed, card.stability);

    // Urgency blends how overdue the card is with how much retention has
    // decayed; both halves live in [0, 1].
    let overdue_part = (days_overdue / OVERDUE_SATURATION_DAYS).min(1.0);
    let urgency = (0.5 * overdue_part + 0.5 * (1.0 - retention)).clamp(0.0, 1.0);

    ProblemCandidate {
        id: problem.id,
        topic: topic_of(problem),
        difficulty: problem.difficulty,
        tags: problem.tags.clone(),
        attempts: card.review_count,
        recent_accuracy,
        urgency_score: urgency,
        retention_probability: retention,
        days_overdue,
    }
}

/// Candidate features for a never-attempted problem.
pub fn candidate_from_problem(problem: &Problem) -> ProblemCandidate {
    ProblemCandidate {
        id: problem.id,
        topic: topic_of(problem),
        difficulty: problem.difficulty,
        tags: problem.tags.clone(),
        attempts: 0,
        recent_accuracy: 0.0,
        urgency_score: NEW_PROBLEM_URGENCY,
        retention_probability: 0.0,
        days_overdue: 0.0,
    }
}

fn topic_of(problem: &Problem) -> String {
    problem
        .categories
        .first()
        .or_else(|| problem.tags.first())
        .cloned()
        .unwrap_or_else(|| "general".to_string())
}
