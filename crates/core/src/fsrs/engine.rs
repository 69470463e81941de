/// FSRS state transitions and memory-model arithmetic.
use chrono::{DateTime, Duration, Utc};
use codetop_domain::{Card, CardState, Rating};

use super::weights::SchedulerParams;

/// Result of applying one review to a card.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub new_state: CardState,
    pub stability: f64,
    pub difficulty: f64,
    pub interval_days: i32,
    pub next_review: DateTime<Utc>,
    /// True when the transition left REVIEW on a grade-1 rating.
    pub lapse: bool,
    /// True when corrupt stored values were replaced by defaults.
    pub recovered: bool,
}

/// Floor for stability after any update.
const MIN_STABILITY: f64 = 0.1;

pub struct FsrsEngine {
    params: SchedulerParams,
}

impl FsrsEngine {
    pub fn new(params: SchedulerParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SchedulerParams {
        &self.params
    }

    // ========================================================================
    // STATE MACHINE
    // ========================================================================

    /// Next card state for a grade, per the four-state transition table.
    pub fn next_state(from: CardState, rating: Rating) -> CardState {
        match (from, rating) {
            (CardState::New, Rating::Easy) => CardState::Review,
            (CardState::New, _) => CardState::Learning,
            (CardState::Learning, Rating::Again | Rating::Hard) => CardState::Learning,
            (CardState::Learning, _) => CardState::Review,
            (CardState::Review, Rating::Again) => CardState::Relearning,
            (CardState::Review, _) => CardState::Review,
            (CardState::Relearning, Rating::Again | Rating::Hard) => CardState::Relearning,
            (CardState::Relearning, _) => CardState::Review,
        }
    }

    // ========================================================================
    // MEMORY MODEL
    // ========================================================================

    /// Probability of recall after `elapsed_days` at the given stability:
    /// `R = exp(ln 0.9 · t / S)`. 1.0 for unreviewed material.
    pub fn retrievability(elapsed_days: f64, stability: f64) -> f64 {
        if stability <= 0.0 || elapsed_days <= 0.0 {
            return 1.0;
        }
        (0.9f64.ln() * elapsed_days / stability).exp()
    }

    fn initial_stability(&self, rating: Rating) -> f64 {
        self.params.w(rating.as_i32() as usize - 1).max(MIN_STABILITY)
    }

    fn initial_difficulty(&self, rating: Rating) -> f64 {
        let g = rating.as_i32() as f64;
        (self.params.w(4) - (g - 3.0) * self.params.w(5)).clamp(1.0, 10.0)
    }

    /// Difficulty update: grade delta plus mean reversion toward w4.
    fn next_difficulty(&self, difficulty: f64, rating: Rating) -> f64 {
        let g = rating.as_i32() as f64;
        let shifted = difficulty - self.params.w(6) * (g - 3.0);
        let reverted = self.params.w(7) * (self.params.w(4) - shifted) + shifted;
        reverted.clamp(1.0, 10.0)
    }

    /// Stability growth after a successful recall (grade >= 2).
    fn stability_success(
        &self,
        difficulty: f64,
        stability: f64,
        retrievability: f64,
        rating: Rating,
    ) -> f64 {
        let hard_penalty = if rating == Rating::Hard {
            self.params.w(15)
        } else {
            1.0
        };
        let easy_bonus = if rating == Rating::Easy {
            self.params.w(16)
        } else {
            1.0
        };

        let growth = self.params.w(8).exp()
            * (11.0 - difficulty)
            * stability.powf(-self.params.w(9))
            * ((self.params.w(10) * (1.0 - retrievability)).exp() - 1.0)
            * hard_penalty
            * easy_bonus;

        (stability * (1.0 + growth)).max(MIN_STABILITY)
    }

    /// Post-lapse stability (grade 1). Never exceeds the previous value.
    fn stability_lapse(&self, difficulty: f64, stability: f64, retrievability: f64) -> f64 {
        let s = self.params.w(11)
            * difficulty.powf(-self.params.w(12))
            * ((stability + 1.0).powf(self.params.w(13)) - 1.0)
            * (self.params.w(14) * (1.0 - retrievability)).exp();
        s.clamp(MIN_STABILITY, stability.max(MIN_STABILITY))
    }

    /// Interval in days hitting the requested retention at the new
    /// stability: `S · ln(r) / ln 0.9`, clamped to [1, maximum_interval].
    pub fn next_interval(&self, stability: f64) -> i32 {
        let raw = stability * self.params.request_retention.ln() / 0.9f64.ln();
        (raw.round() as i64).clamp(1, self.params.maximum_interval as i64) as i32
    }

    // ========================================================================
    // REVIEW APPLICATION
    // ========================================================================

    /// Apply one graded review to a card, producing its next memory state,
    /// schedule, and state-machine transition.
    pub fn review(
        &self,
        card: &Card,
        rating: Rating,
        elapsed_days: f64,
        now: DateTime<Utc>,
    ) -> ReviewOutcome {
        let first_review = card.state == CardState::New || card.review_count == 0;

        // Corrupt rows (zeroed or negative memory fields on a reviewed card)
        // are recovered by restarting from the initial-state formulas.
        let recovered = !first_review && (card.stability <= 0.0 || card.difficulty <= 0.0);
        let (old_stability, old_difficulty) = if recovered {
            (
                self.initial_stability(Rating::Good),
                self.initial_difficulty(Rating::Good),
            )
        } else {
            (card.stability, card.difficulty)
        };

        let (stability, difficulty) = if first_review {
            (self.initial_stability(rating), self.initial_difficulty(rating))
        } else {
            let retrievability = Self::retrievability(elapsed_days, old_stability);
            let difficulty = self.next_difficulty(old_difficulty, rating);
            let stability = if rating == Rating::Again {
                self.stability_lapse(old_difficulty, old_stability, retrievability)
            } else {
                self.stability_success(old_difficulty, old_stability, retrievability, rating)
            };
            (stability, difficulty)
        };

        let new_state = Self::next_state(card.state, rating);
        let lapse = card.state == CardState::Review && rating == Rating::Again;

        // Learning steps re-review the next day; only graduated cards use
        // the retention-derived interval.
        let interval_days = match new_state {
            CardState::Learning | CardState::Relearning => 1,
            _ => self.next_interval(stability),
        };
        let next_review = now + Duration::days(interval_days as i64);

        ReviewOutcome {
            new_state,
            stability,
            difficulty,
            interval_days,
            next_review,
            lapse,
            recovered,
        }
    }
}
