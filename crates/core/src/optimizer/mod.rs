/// Per-user FSRS parameter fitting.
///
/// Replays each card's chronological review history under candidate
/// weights, scores recall predictions with recency-weighted log-loss, and
/// descends a central-finite-difference gradient over the 17 weights.
/// Every step clamps each weight back into its configured domain; the
/// best-scoring weight vector seen wins, so a fit never regresses the loss
/// it started from.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use codetop_config::{FsrsDefaults, OptimizerConfig};
use codetop_domain::{Rating, ReviewLog};
use uuid::Uuid;

use crate::fsrs::{FsrsEngine, SchedulerParams, RETENTION_MAX, RETENTION_MIN};

/// Finite-difference step for the numeric gradient.
const GRADIENT_STEP: f64 = 1e-4;
/// Probability clamp keeping the log-loss finite.
const PROB_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub weights: [f64; 17],
    pub request_retention: f64,
    pub training_count: i32,
    /// Loss of the incoming weights on this window.
    pub old_loss: f64,
    /// Loss of the fitted weights on the same window.
    pub new_loss: f64,
    pub iterations: usize,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FitError {
    #[error("insufficient training data: {actual} of {required} required reviews")]
    InsufficientData { required: usize, actual: usize },
    #[error("numerical divergence during gradient descent")]
    NumericalDivergence,
}

/// One scored prediction extracted from a replayed history.
struct Sample {
    /// Elapsed days between this review and the previous one.
    elapsed_days: f64,
    /// Grade of this review.
    rating: Rating,
    /// Whether the review counted as successful recall (grade >= 3).
    success: bool,
    /// Recency weight, 0.5^(age_days / half_life).
    recency: f64,
}

/// A card's review sequence in chronological order. The first entry seeds
/// the replayed memory state and is not scored.
struct Sequence {
    first_rating: Rating,
    rest: Vec<Sample>,
}

pub struct ParameterOptimizer {
    config: OptimizerConfig,
    defaults: FsrsDefaults,
}

impl ParameterOptimizer {
    pub fn new(config: OptimizerConfig, defaults: FsrsDefaults) -> Self {
        Self { config, defaults }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Fit weights and retention for one user from their review window.
    ///
    /// `logs` is the training window (newest first as fetched); ordering is
    /// normalized internally. Errors with `InsufficientData` below the
    /// eligibility floor and `NumericalDivergence` when the loss or
    /// gradient stops being finite.
    pub fn fit(
        &self,
        logs: &[ReviewLog],
        current_weights: [f64; 17],
        now: DateTime<Utc>,
    ) -> Result<FitResult, FitError> {
        let usable: Vec<&ReviewLog> = logs
            .iter()
            .filter(|log| {
                log.elapsed_days.is_finite()
                    && log.old_stability.is_finite()
                    && log.new_stability.is_finite()
                    && Rating::from_i32(log.rating).is_some()
            })
            .collect();

        if usable.len() < self.config.min_reviews {
            return Err(FitError::InsufficientData {
                required: self.config.min_reviews,
                actual: usable.len(),
            });
        }

        let sequences = self.build_sequences(&usable, now);
        let observed_success = observed_success_rate(&usable);

        let bounds = self.bounds();
        let mut weights = clamp_weights(current_weights, &bounds);
        let old_loss = self.loss(&sequences, weights);
        if !old_loss.is_finite() {
            return Err(FitError::NumericalDivergence);
        }

        let mut best_weights = weights;
        let mut best_loss = old_loss;
        let mut iterations = 0;

        for iteration in 0..self.config.max_iterations {
            iterations = iteration + 1;
            let gradient = self.gradient(&sequences, weights)?;

            let norm: f64 = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();
            if !norm.is_finite() {
                return Err(FitError::NumericalDivergence);
            }
            if norm < self.config.epsilon {
                break;
            }

            for (w, g) in weights.iter_mut().zip(gradient.iter()) {
                *w -= self.config.learning_rate * g;
            }
            weights = clamp_weights(weights, &bounds);

            let loss = self.loss(&sequences, weights);
            if !loss.is_finite() {
                return Err(FitError::NumericalDivergence);
            }
            if loss < best_loss {
                best_loss = loss;
                best_weights = weights;
            }
        }

        // Retention does not enter the recall likelihood; refit it directly
        // from the observed success rate within its allowed band.
        let request_retention = observed_success.clamp(RETENTION_MIN, RETENTION_MAX);

        Ok(FitResult {
            weights: best_weights,
            request_retention,
            training_count: usable.len() as i32,
            old_loss,
            new_loss: best_loss,
            iterations,
        })
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        self.defaults.weight_bounds.clone()
    }

    /// Group logs per card and order them for replay.
    fn build_sequences(&self, logs: &[&ReviewLog], now: DateTime<Utc>) -> Vec<Sequence> {
        let half_life = self.config.recency_half_life_days.max(1.0);

        let mut by_card: HashMap<Uuid, Vec<&ReviewLog>> = HashMap::new();
        for log in logs {
            by_card.entry(log.card_id).or_default().push(log);
        }

        let mut sequences = Vec::with_capacity(by_card.len());
        for (_, mut card_logs) in by_card {
            card_logs.sort_by_key(|log| log.reviewed_at);
            let Some(first) = card_logs.first() else {
                continue;
            };
            let Some(first_rating) = Rating::from_i32(first.rating) else {
                continue;
            };

            let rest = card_logs[1..]
                .iter()
                .filter_map(|log| {
                    let rating = Rating::from_i32(log.rating)?;
                    let age_days =
                        (now - log.reviewed_at).num_seconds().max(0) as f64 / 86_400.0;
                    Some(Sample {
                        elapsed_days: log.elapsed_days.max(0.0),
                        rating,
                        success: rating.is_success(),
                        recency: 0.5f64.powf(age_days / half_life),
                    })
                })
                .collect();

            sequences.push(Sequence { first_rating, rest });
        }
        sequences
    }

    /// Recency-weighted log-loss of recall predictions under `weights`.
    fn loss(&self, sequences: &[Sequence], weights: [f64; 17]) -> f64 {
        let engine = self.engine(weights);

        let mut total = 0.0;
        let mut weight_sum = 0.0;

        for sequence in sequences {
            let mut outcome = engine.review(
                &seed_card(),
                sequence.first_rating,
                0.0,
                DateTime::<Utc>::MIN_UTC,
            );

            for sample in &sequence.rest {
                let p = FsrsEngine::retrievability(sample.elapsed_days, outcome.stability)
                    .clamp(PROB_FLOOR, 1.0 - PROB_FLOOR);
                let y = if sample.success { 1.0 } else { 0.0 };
                total -= sample.recency * (y * p.ln() + (1.0 - y) * (1.0 - p).ln());
                weight_sum += sample.recency;

                let mut card = seed_card();
                card.state = outcome.new_state;
                card.stability = outcome.stability;
                card.difficulty = outcome.difficulty;
                card.review_count = 1;
                outcome = engine.review(
                    &card,
                    sample.rating,
                    sample.elapsed_days,
                    DateTime::<Utc>::MIN_UTC,
                );
            }
        }

        if weight_sum == 0.0 {
            return 0.0;
        }
        total / weight_sum
    }

    /// Central finite differences over the 17 weights.
    fn gradient(
        &self,
        sequences: &[Sequence],
        weights: [f64; 17],
    ) -> Result<[f64; 17], FitError> {
        let mut gradient = [0.0; 17];
        for k in 0..17 {
            let mut plus = weights;
            let mut minus = weights;
            plus[k] += GRADIENT_STEP;
            minus[k] -= GRADIENT_STEP;

            let loss_plus = self.loss(sequences, plus);
            let loss_minus = self.loss(sequences, minus);
            if !loss_plus.is_finite() || !loss_minus.is_finite() {
                return Err(FitError::NumericalDivergence);
            }
            gradient[k] = (loss_plus - loss_minus) / (2.0 * GRADIENT_STEP);
        }
        Ok(gradient)
    }

    fn engine(&self, weights: [f64; 17]) -> FsrsEngine {
        FsrsEngine::new(SchedulerParams {
            weights,
            request_retention: self.defaults.request_retention,
            maximum_interval: self.defaults.maximum_interval,
        })
    }
}

fn clamp_weights(mut weights: [f64; 17], bounds: &[(f64, f64)]) -> [f64; 17] {
    for (w, (lo, hi)) in weights.iter_mut().zip(bounds.iter()) {
        *w = w.clamp(*lo, *hi);
    }
    weights
}

fn observed_success_rate(logs: &[&ReviewLog]) -> f64 {
    if logs.is_empty() {
        return RETENTION_MIN;
    }
    let successes = logs.iter().filter(|log| log.rating >= 3).count();
    successes as f64 / logs.len() as f64
}

/// Placeholder NEW card used to seed history replay.
fn seed_card() -> codetop_domain::Card {
    codetop_domain::Card::new(Uuid::nil(), 0, DateTime::<Utc>::MIN_UTC)
}
