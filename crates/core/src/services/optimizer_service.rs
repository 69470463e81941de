/// Parameter optimization orchestration.
///
/// Wraps the numeric optimizer with eligibility checks, parameter-row
/// activation, and the scheduled re-optimization sweep. A failed fit never
/// touches stored parameters.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use codetop_config::FsrsDefaults;
use codetop_domain::{
    DomainError, DomainEvent, OptimizeParametersResponse, OptimizedParameters, UserParameters,
};
use uuid::Uuid;

use crate::events::EventBus;
use crate::optimizer::{FitError, ParameterOptimizer};
use crate::ports::{ParameterRepository, ReviewLogRepository};

/// Outcome of one optimization attempt, before DTO mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizationOutcome {
    Optimized(OptimizedParameters),
    Skipped { reason: String },
}

pub struct OptimizerService {
    logs: Arc<dyn ReviewLogRepository>,
    parameters: Arc<dyn ParameterRepository>,
    optimizer: ParameterOptimizer,
    defaults: FsrsDefaults,
    bus: EventBus,
}

impl OptimizerService {
    pub fn new(
        logs: Arc<dyn ReviewLogRepository>,
        parameters: Arc<dyn ParameterRepository>,
        optimizer: ParameterOptimizer,
        defaults: FsrsDefaults,
        bus: EventBus,
    ) -> Self {
        Self {
            logs,
            parameters,
            optimizer,
            defaults,
            bus,
        }
    }

    pub async fn optimize_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<OptimizeParametersResponse, DomainError> {
        let outcome = self.run_fit(user_id, now).await?;
        Ok(match outcome {
            OptimizationOutcome::Optimized(parameters) => OptimizeParametersResponse {
                optimized: true,
                parameters: Some(parameters),
                reason: None,
            },
            OptimizationOutcome::Skipped { reason } => OptimizeParametersResponse {
                optimized: false,
                parameters: None,
                reason: Some(reason),
            },
        })
    }

    async fn run_fit(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<OptimizationOutcome, DomainError> {
        let config = self.optimizer.config();
        let logs = self
            .logs
            .list_for_training(user_id, config.max_logs as u32)
            .await
            .map_err(|e| DomainError::Transient(e.to_string()))?;

        let current = self
            .parameters
            .get_active(user_id)
            .await
            .map_err(|e| DomainError::Transient(e.to_string()))?;
        let current_weights = current
            .as_ref()
            .map(|p| p.weights)
            .unwrap_or(self.defaults.weights);

        let result = match self.optimizer.fit(&logs, current_weights, now) {
            Ok(result) => result,
            Err(FitError::InsufficientData { required, actual }) => {
                return Ok(OptimizationOutcome::Skipped {
                    reason: format!("insufficientReviews: {actual} of {required}"),
                });
            }
            Err(FitError::NumericalDivergence) => {
                // Previous parameters stay untouched.
                tracing::warn!(user_id = %user_id, "optimization diverged, keeping parameters");
                return Ok(OptimizationOutcome::Skipped {
                    reason: "numericalDivergence".to_string(),
                });
            }
        };

        // Score is negated loss; improvement is newScore - oldScore.
        let improvement = result.old_loss - result.new_loss;
        let row = UserParameters {
            id: Uuid::new_v4(),
            user_id,
            weights: result.weights,
            request_retention: result.request_retention,
            maximum_interval: current
                .as_ref()
                .map(|p| p.maximum_interval)
                .unwrap_or(self.defaults.maximum_interval),
            is_active: true,
            training_count: result.training_count,
            optimized_at: Some(now),
            performance_improvement: Some(improvement),
            created_at: now,
        };

        self.parameters
            .activate(&row)
            .await
            .map_err(|e| DomainError::Transient(e.to_string()))?;

        // Post-commit.
        self.bus
            .publish(DomainEvent::ParametersOptimized { user_id });

        tracing::info!(
            user_id = %user_id,
            training_count = result.training_count,
            iterations = result.iterations,
            improvement,
            "user parameters optimized"
        );

        Ok(OptimizationOutcome::Optimized(OptimizedParameters {
            weights: result.weights.to_vec(),
            request_retention: result.request_retention,
            training_count: result.training_count,
            performance_improvement: improvement,
        }))
    }

    /// One scheduled sweep: fit every currently eligible user, bounded by
    /// the per-tick ceiling. Individual failures are logged and skipped.
    pub async fn run_scheduled_tick(&self, now: DateTime<Utc>) -> usize {
        let config = self.optimizer.config();
        let candidates = match self
            .parameters
            .list_reoptimization_candidates(
                config.min_new_reviews,
                config.batch_users_per_tick as u32,
            )
            .await
        {
            Ok(candidates) => candidates,
            Err(error) => {
                tracing::error!(%error, "failed to list re-optimization candidates");
                return 0;
            }
        };

        let mut processed = 0;
        for user_id in candidates {
            match self.optimize_user(user_id, now).await {
                Ok(response) => {
                    processed += 1;
                    if !response.optimized {
                        tracing::debug!(user_id = %user_id, reason = ?response.reason, "fit skipped");
                    }
                }
                Err(error) => {
                    tracing::warn!(user_id = %user_id, %error, "scheduled optimization failed");
                }
            }
        }
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{MockParameterRepository, MockReviewLogRepository};
    use chrono::Duration;
    use codetop_config::OptimizerConfig;
    use codetop_domain::{CardState, ReviewLog, ReviewType};
    use std::sync::Mutex;

    fn training_logs(count: usize) -> Vec<ReviewLog> {
        (0..count)
            .map(|i| ReviewLog {
                id: Uuid::new_v4(),
                user_id: Uuid::nil(),
                problem_id: (i % 10) as i64,
                card_id: Uuid::from_u128((i % 10) as u128),
                rating: if i % 4 == 0 { 1 } else { 3 },
                elapsed_days: (i % 7) as f64,
                review_type: ReviewType::Scheduled,
                old_state: CardState::Review,
                new_state: CardState::Review,
                old_stability: 5.0,
                new_stability: 6.0,
                reviewed_at: Utc::now() - Duration::days((count - i) as i64),
            })
            .collect()
    }

    fn service(
        logs: MockReviewLogRepository,
        parameters: MockParameterRepository,
        bus: EventBus,
    ) -> OptimizerService {
        let config = OptimizerConfig {
            max_iterations: 3,
            ..OptimizerConfig::default()
        };
        OptimizerService::new(
            Arc::new(logs),
            Arc::new(parameters),
            ParameterOptimizer::new(config, FsrsDefaults::default()),
            FsrsDefaults::default(),
            bus,
        )
    }

    #[tokio::test]
    async fn test_insufficient_reviews_returns_unoptimized() {
        let mut logs = MockReviewLogRepository::new();
        logs.expect_list_for_training()
            .returning(|_, _| Ok(training_logs(49)));
        let mut parameters = MockParameterRepository::new();
        parameters.expect_get_active().returning(|_| Ok(None));
        parameters.expect_activate().times(0);

        let response = service(logs, parameters, EventBus::new())
            .optimize_user(Uuid::from_u128(1), Utc::now())
            .await
            .unwrap();

        assert!(!response.optimized);
        assert!(response.reason.unwrap().starts_with("insufficientReviews"));
    }

    #[tokio::test]
    async fn test_successful_fit_activates_and_publishes() {
        let activated: Arc<Mutex<Vec<UserParameters>>> = Arc::new(Mutex::new(Vec::new()));
        let activated_clone = Arc::clone(&activated);

        let mut logs = MockReviewLogRepository::new();
        logs.expect_list_for_training()
            .returning(|_, _| Ok(training_logs(60)));
        let mut parameters = MockParameterRepository::new();
        parameters.expect_get_active().returning(|_| Ok(None));
        parameters.expect_activate().returning(move |row| {
            activated_clone.lock().unwrap().push(row.clone());
            Ok(())
        });

        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let user = Uuid::from_u128(5);

        let response = service(logs, parameters, bus)
            .optimize_user(user, Utc::now())
            .await
            .unwrap();

        assert!(response.optimized);
        let fitted = response.parameters.unwrap();
        assert!(fitted.request_retention >= 0.70 && fitted.request_retention <= 0.97);
        assert_eq!(fitted.training_count, 60);

        let rows = activated.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_active);
        assert!(rows[0].optimized_at.is_some());

        assert_eq!(
            events.recv().await.unwrap(),
            DomainEvent::ParametersOptimized { user_id: user }
        );
    }

    #[tokio::test]
    async fn test_scheduled_tick_bounded_by_candidates() {
        let mut logs = MockReviewLogRepository::new();
        logs.expect_list_for_training()
            .returning(|_, _| Ok(training_logs(10))); // all skipped
        let mut parameters = MockParameterRepository::new();
        parameters
            .expect_list_reoptimization_candidates()
            .returning(|_, _| Ok(vec![Uuid::from_u128(1), Uuid::from_u128(2)]));
        parameters.expect_get_active().returning(|_| Ok(None));

        let processed = service(logs, parameters, EventBus::new())
            .run_scheduled_tick(Utc::now())
            .await;
        assert_eq!(processed, 2);
    }
}
