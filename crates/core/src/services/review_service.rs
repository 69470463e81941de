/// Review submission.
///
/// The write path of the scheduler: validate, load-or-create the card,
/// apply the FSRS transition, persist card + log atomically, then publish
/// `ReviewCompleted` strictly after the repository call returned (i.e.
/// post-commit). Idempotency wraps the whole operation when the caller
/// supplies a request id.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use codetop_config::FsrsDefaults;
use codetop_domain::{
    Card, DomainError, DomainEvent, Rating, ReviewLog, ReviewType, SubmitReviewRequest,
    SubmitReviewResponse, UserParameters,
};
use uuid::Uuid;

use crate::events::EventBus;
use crate::fsrs::{FsrsEngine, SchedulerParams};
use crate::idempotency::IdempotencyService;
use crate::metrics::Metrics;
use crate::ports::{CardRepository, ParameterRepository, ProblemRepository};

const OPERATION: &str = "review_submit";

pub struct ReviewService {
    cards: Arc<dyn CardRepository>,
    problems: Arc<dyn ProblemRepository>,
    parameters: Arc<dyn ParameterRepository>,
    idempotency: Arc<IdempotencyService>,
    bus: EventBus,
    metrics: Arc<Metrics>,
    defaults: FsrsDefaults,
}

impl ReviewService {
    pub fn new(
        cards: Arc<dyn CardRepository>,
        problems: Arc<dyn ProblemRepository>,
        parameters: Arc<dyn ParameterRepository>,
        idempotency: Arc<IdempotencyService>,
        bus: EventBus,
        metrics: Arc<Metrics>,
        defaults: FsrsDefaults,
    ) -> Self {
        Self {
            cards,
            problems,
            parameters,
            idempotency,
            bus,
            metrics,
            defaults,
        }
    }

    /// Submit a review. With a request id the write is deduplicated through
    /// the idempotency store; the replayed response is byte-identical.
    pub async fn submit(
        &self,
        user_id: Uuid,
        request: &SubmitReviewRequest,
        request_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SubmitReviewResponse, DomainError> {
        match request_id {
            Some(request_id) => {
                self.idempotency
                    .execute(request_id, user_id, OPERATION, || {
                        self.submit_inner(user_id, request, now)
                    })
                    .await
            }
            None => self.submit_inner(user_id, request, now).await,
        }
    }

    async fn submit_inner(
        &self,
        user_id: Uuid,
        request: &SubmitReviewRequest,
        now: DateTime<Utc>,
    ) -> Result<SubmitReviewResponse, DomainError> {
        let rating = Rating::from_i32(request.rating)
            .ok_or_else(|| DomainError::InvalidInput(format!("rating {}", request.rating)))?;
        let review_type = request
            .review_type
            .as_deref()
            .map(ReviewType::parse)
            .unwrap_or_default();

        let problem = self
            .problems
            .get(request.problem_id)
            .await
            .map_err(|e| DomainError::Transient(e.to_string()))?
            .filter(|p| !p.deleted)
            .ok_or_else(|| {
                DomainError::NotFound(format!("problem {}", request.problem_id))
            })?;

        // Cards are created lazily on first interaction.
        let card = self
            .cards
            .get_card(user_id, problem.id)
            .await
            .map_err(|e| DomainError::Transient(e.to_string()))?
            .unwrap_or_else(|| Card::new(user_id, problem.id, now));

        let params = self.scheduler_params(user_id, now).await?;
        let engine = FsrsEngine::new(params);

        let elapsed_days = match request.elapsed_days {
            Some(days) => days.max(0.0),
            None => card
                .last_review
                .map(|last| ((now - last).num_seconds().max(0) as f64 / 86_400.0).floor())
                .unwrap_or(0.0),
        };

        let outcome = engine.review(&card, rating, elapsed_days, now);
        if outcome.recovered {
            self.metrics.record_corrupt_card_recovery();
            tracing::warn!(user_id = %user_id, problem_id = problem.id, "recovered corrupt card state");
        }

        let old_state = card.state;
        let old_stability = card.stability;
        let updated = Card {
            state: outcome.new_state,
            stability: outcome.stability,
            difficulty: outcome.difficulty,
            review_count: card.review_count + 1,
            lapses: card.lapses + if outcome.lapse { 1 } else { 0 },
            last_review: Some(now),
            next_review: Some(outcome.next_review),
            interval_days: outcome.interval_days,
            last_rating: rating.as_i32(),
            ..card
        };

        let log = ReviewLog {
            id: Uuid::new_v4(),
            user_id,
            problem_id: problem.id,
            card_id: updated.id,
            rating: rating.as_i32(),
            elapsed_days,
            review_type,
            old_state,
            new_state: updated.state,
            old_stability,
            new_stability: updated.stability,
            reviewed_at: now,
        };

        self.cards
            .save_review(&updated, &log)
            .await
            .map_err(|e| DomainError::Transient(e.to_string()))?;

        // Post-commit: save_review returned, the transaction is durable.
        self.bus.publish(DomainEvent::ReviewCompleted {
            user_id,
            problem_id: problem.id,
            rating: rating.as_i32(),
        });

        tracing::info!(
            user_id = %user_id,
            problem_id = problem.id,
            rating = rating.as_i32(),
            old_state = %old_state,
            new_state = %updated.state,
            interval_days = updated.interval_days,
            "review submitted"
        );

        Ok(SubmitReviewResponse {
            card_id: updated.id,
            new_state: updated.state,
            new_stability: updated.stability,
            new_difficulty: updated.difficulty,
            interval_days: updated.interval_days,
            next_review_at: outcome.next_review,
        })
    }

    /// Active user parameters, creating the default row on first use.
    async fn scheduler_params(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SchedulerParams, DomainError> {
        let active = self
            .parameters
            .get_active(user_id)
            .await
            .map_err(|e| DomainError::Transient(e.to_string()))?;

        match active {
            Some(params) => Ok(SchedulerParams::from_user_parameters(&params)),
            None => {
                let initial = UserParameters {
                    id: Uuid::new_v4(),
                    user_id,
                    weights: self.defaults.weights,
                    request_retention: self.defaults.request_retention,
                    maximum_interval: self.defaults.maximum_interval,
                    is_active: true,
                    training_count: 0,
                    optimized_at: None,
                    performance_improvement: None,
                    created_at: now,
                };
                self.parameters
                    .insert_initial(&initial)
                    .await
                    .map_err(|e| DomainError::Transient(e.to_string()))?;
                Ok(SchedulerParams::from_user_parameters(&initial))
            }
        }
    }
}
