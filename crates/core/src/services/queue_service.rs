/// Review queue and stats reads, cached under the fsrs domain.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use codetop_config::{CacheTtlConfig, QueueConfig};
use codetop_domain::{
    Card, CardState, Problem, QueueCard, QueueMeta, ReviewQueueResponse, ReviewStatsResponse,
};
use uuid::Uuid;

use crate::cache::{keys, CacheStore};
use crate::fsrs::assemble_queue;
use crate::ports::{CardRepository, ProblemRepository, ReviewLogRepository};

pub struct QueueService {
    cards: Arc<dyn CardRepository>,
    problems: Arc<dyn ProblemRepository>,
    logs: Arc<dyn ReviewLogRepository>,
    cache: CacheStore,
    config: QueueConfig,
    queue_ttl: Duration,
    stats_ttl: Duration,
}

impl QueueService {
    pub fn new(
        cards: Arc<dyn CardRepository>,
        problems: Arc<dyn ProblemRepository>,
        logs: Arc<dyn ReviewLogRepository>,
        cache: CacheStore,
        config: QueueConfig,
        ttl_config: &CacheTtlConfig,
    ) -> Self {
        Self {
            cards,
            problems,
            logs,
            cache,
            config,
            queue_ttl: Duration::from_secs(ttl_config.fsrs_queue_secs),
            stats_ttl: Duration::from_secs(ttl_config.fsrs_stats_secs),
        }
    }

    /// Effective limit for a raw query parameter.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.config.default_limit)
            .clamp(1, self.config.max_limit)
    }

    pub async fn queue(
        &self,
        user_id: Uuid,
        limit: usize,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ReviewQueueResponse> {
        let key = keys::fsrs_queue(user_id, limit);
        if let Some(cached) = self.cache.get::<ReviewQueueResponse>(&key) {
            return Ok(cached);
        }

        let learning_due = self
            .cards
            .list_due(
                user_id,
                &[CardState::Learning, CardState::Relearning],
                now,
                limit as u32,
            )
            .await?;
        let review_due = self
            .cards
            .list_due(user_id, &[CardState::Review], now, limit as u32)
            .await?;
        let fresh = self.problems.list_unseen(user_id, limit as u32).await?;

        let queue = assemble_queue(learning_due, review_due, fresh, limit, &self.config);

        let due_problem_ids: Vec<i64> = queue
            .learning
            .iter()
            .chain(queue.review.iter())
            .map(|card| card.problem_id)
            .collect();
        let metadata: HashMap<i64, Problem> = self
            .problems
            .get_many(&due_problem_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let due_cards: Vec<QueueCard> = queue
            .learning
            .iter()
            .chain(queue.review.iter())
            .filter_map(|card| {
                metadata
                    .get(&card.problem_id)
                    .map(|problem| queue_card(card, problem))
            })
            .collect();
        let new_cards: Vec<QueueCard> = queue.fresh.iter().map(new_queue_card).collect();

        let response = ReviewQueueResponse {
            meta: QueueMeta {
                total: due_cards.len() + new_cards.len(),
                generated_at: now,
            },
            due_cards,
            new_cards,
        };
        self.cache.put(&key, &response, self.queue_ttl);
        Ok(response)
    }

    pub async fn stats(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ReviewStatsResponse> {
        let key = keys::fsrs_stats(user_id);
        if let Some(cached) = self.cache.get::<ReviewStatsResponse>(&key) {
            return Ok(cached);
        }

        let counts = self.cards.state_counts(user_id, now).await?;
        let total_reviews = self.logs.count_for_user(user_id).await?;

        let response = ReviewStatsResponse {
            due_now: counts.due_now,
            new_cards: counts.total_cards - counts.learning - counts.review - counts.relearning,
            learning: counts.learning,
            review: counts.review,
            relearning: counts.relearning,
            total_reviews,
        };
        self.cache.put(&key, &response, self.stats_ttl);
        Ok(response)
    }
}

fn queue_card(card: &Card, problem: &Problem) -> QueueCard {
    QueueCard {
        id: card.id,
        problem_id: card.problem_id,
        problem_title: problem.title.clone(),
        difficulty: problem.difficulty,
        state: card.state,
        stability: card.stability,
        due_date: card.next_review,
    }
}

/// NEW entries have no card row yet; the card id materializes on first
/// review, so the nil uuid marks "not yet created".
fn new_queue_card(problem: &Problem) -> QueueCard {
    QueueCard {
        id: Uuid::nil(),
        problem_id: problem.id,
        problem_title: problem.title.clone(),
        difficulty: problem.difficulty,
        state: CardState::New,
        stability: 0.0,
        due_date: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::ports::{
        MockCardRepository, MockProblemRepository, MockReviewLogRepository, StateCounts,
    };
    use chrono::Duration as ChronoDuration;
    use codetop_domain::ProblemDifficulty;

    fn problem(id: i64) -> Problem {
        Problem {
            id,
            title: format!("Problem {id}"),
            difficulty: ProblemDifficulty::Medium,
            tags: vec![],
            categories: vec![],
            deleted: false,
            created_at: Utc::now(),
        }
    }

    fn due_card(user: Uuid, problem_id: i64, state: CardState) -> Card {
        let now = Utc::now();
        let mut card = Card::new(user, problem_id, now);
        card.state = state;
        card.stability = 4.0;
        card.difficulty = 5.0;
        card.review_count = 2;
        card.next_review = Some(now - ChronoDuration::days(1));
        card
    }

    fn service(
        cards: MockCardRepository,
        problems: MockProblemRepository,
        logs: MockReviewLogRepository,
    ) -> QueueService {
        QueueService::new(
            Arc::new(cards),
            Arc::new(problems),
            Arc::new(logs),
            CacheStore::new(Arc::new(Metrics::new())),
            QueueConfig::default(),
            &CacheTtlConfig::default(),
        )
    }

    #[test]
    fn test_effective_limit_clamped() {
        let service = service(
            MockCardRepository::new(),
            MockProblemRepository::new(),
            MockReviewLogRepository::new(),
        );
        assert_eq!(service.effective_limit(None), 20);
        assert_eq!(service.effective_limit(Some(0)), 1);
        assert_eq!(service.effective_limit(Some(500)), 100);
    }

    #[tokio::test]
    async fn test_queue_separates_due_and_new() {
        let user = Uuid::from_u128(1);
        let mut cards = MockCardRepository::new();
        cards
            .expect_list_due()
            .withf(|_, states, _, _| states.contains(&CardState::Learning))
            .returning(move |u, _, _, _| Ok(vec![due_card(u, 1, CardState::Learning)]));
        cards
            .expect_list_due()
            .withf(|_, states, _, _| states.contains(&CardState::Review))
            .returning(move |u, _, _, _| Ok(vec![due_card(u, 2, CardState::Review)]));

        let mut problems = MockProblemRepository::new();
        problems
            .expect_list_unseen()
            .returning(|_, _| Ok(vec![problem(3)]));
        problems
            .expect_get_many()
            .returning(|ids| Ok(ids.iter().map(|id| problem(*id)).collect()));

        let service = service(cards, problems, MockReviewLogRepository::new());
        let response = service.queue(user, 10, Utc::now()).await.unwrap();

        assert_eq!(response.due_cards.len(), 2);
        assert_eq!(response.new_cards.len(), 1);
        assert_eq!(response.meta.total, 3);
        // Learning before review in the due section.
        assert_eq!(response.due_cards[0].problem_id, 1);
        assert_eq!(response.new_cards[0].state, CardState::New);
    }

    #[tokio::test]
    async fn test_queue_cached_between_calls() {
        let mut cards = MockCardRepository::new();
        cards.expect_list_due().times(2).returning(|_, _, _, _| Ok(vec![]));
        let mut problems = MockProblemRepository::new();
        problems
            .expect_list_unseen()
            .times(1)
            .returning(|_, _| Ok(vec![problem(3)]));
        problems.expect_get_many().times(1).returning(|_| Ok(vec![]));

        let service = service(cards, problems, MockReviewLogRepository::new());
        let user = Uuid::from_u128(1);
        let now = Utc::now();
        let first = service.queue(user, 10, now).await.unwrap();
        let second = service.queue(user, 10, now).await.unwrap();
        assert_eq!(first.meta.total, second.meta.total);
        assert_eq!(
            first.new_cards[0].problem_id,
            second.new_cards[0].problem_id
        );
    }

    #[tokio::test]
    async fn test_stats_aggregates_counts() {
        let mut cards = MockCardRepository::new();
        cards.expect_state_counts().returning(|_, _| {
            Ok(StateCounts {
                due_now: 4,
                learning: 2,
                review: 10,
                relearning: 1,
                total_cards: 15,
            })
        });
        let mut logs = MockReviewLogRepository::new();
        logs.expect_count_for_user().returning(|_| Ok(123));

        let service = service(cards, MockProblemRepository::new(), logs);
        let stats = service.stats(Uuid::from_u128(1), Utc::now()).await.unwrap();
        assert_eq!(stats.due_now, 4);
        assert_eq!(stats.new_cards, 2); // 15 - 2 - 10 - 1
        assert_eq!(stats.total_reviews, 123);
    }
}
