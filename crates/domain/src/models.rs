//! Core entities: cards, problems, review logs, user parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// ENUMS
// ============================================================================

/// Subscription tier. Keys in config are normalized to this casing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Free,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "FREE",
            Tier::Bronze => "BRONZE",
            Tier::Silver => "SILVER",
            Tier::Gold => "GOLD",
            Tier::Platinum => "PLATINUM",
        }
    }

    /// Case-insensitive parse; unknown tiers default to FREE.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "BRONZE" => Tier::Bronze,
            "SILVER" => Tier::Silver,
            "GOLD" => Tier::Gold,
            "PLATINUM" => Tier::Platinum,
            _ => Tier::Free,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Problem difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemDifficulty {
    Easy,
    Medium,
    Hard,
}

impl ProblemDifficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemDifficulty::Easy => "EASY",
            ProblemDifficulty::Medium => "MEDIUM",
            ProblemDifficulty::Hard => "HARD",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "MEDIUM" => ProblemDifficulty::Medium,
            "HARD" => ProblemDifficulty::Hard,
            _ => ProblemDifficulty::Easy,
        }
    }

    /// Ordinal level 1..3, used for "one notch above" comparisons.
    pub fn level(&self) -> u8 {
        match self {
            ProblemDifficulty::Easy => 1,
            ProblemDifficulty::Medium => 2,
            ProblemDifficulty::Hard => 3,
        }
    }
}

/// FSRS card state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardState {
    New,
    Learning,
    Review,
    Relearning,
}

impl CardState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardState::New => "NEW",
            CardState::Learning => "LEARNING",
            CardState::Review => "REVIEW",
            CardState::Relearning => "RELEARNING",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "LEARNING" => CardState::Learning,
            "REVIEW" => CardState::Review,
            "RELEARNING" => CardState::Relearning,
            _ => CardState::New,
        }
    }
}

impl std::fmt::Display for CardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Self-assessed review rating, 1..4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    /// Validate and convert a raw integer rating.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Rating::Again),
            2 => Some(Rating::Hard),
            3 => Some(Rating::Good),
            4 => Some(Rating::Easy),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// A review counts as successful recall at Good or better.
    pub fn is_success(&self) -> bool {
        self.as_i32() >= 3
    }
}

/// How a review was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewType {
    #[default]
    Scheduled,
    Ahead,
    Manual,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewType::Scheduled => "SCHEDULED",
            ReviewType::Ahead => "AHEAD",
            ReviewType::Manual => "MANUAL",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "AHEAD" => ReviewType::Ahead,
            "MANUAL" => ReviewType::Manual,
            _ => ReviewType::Scheduled,
        }
    }
}

/// Learning objective used by the strategy mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LearningObjective {
    #[default]
    WeaknessFocus,
    ProgressiveDifficulty,
    TopicCoverage,
    ExamPrep,
    RefreshMastered,
}

impl LearningObjective {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningObjective::WeaknessFocus => "WEAKNESS_FOCUS",
            LearningObjective::ProgressiveDifficulty => "PROGRESSIVE_DIFFICULTY",
            LearningObjective::TopicCoverage => "TOPIC_COVERAGE",
            LearningObjective::ExamPrep => "EXAM_PREP",
            LearningObjective::RefreshMastered => "REFRESH_MASTERED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "PROGRESSIVE_DIFFICULTY" => LearningObjective::ProgressiveDifficulty,
            "TOPIC_COVERAGE" => LearningObjective::TopicCoverage,
            "EXAM_PREP" => LearningObjective::ExamPrep,
            "REFRESH_MASTERED" => LearningObjective::RefreshMastered,
            _ => LearningObjective::WeaknessFocus,
        }
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

/// User entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
}

/// Algorithm problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: i64,
    pub title: String,
    pub difficulty: ProblemDifficulty,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// One spaced-repetition card per (user, problem).
///
/// Invariants: `state == New` iff `review_count == 0` iff `last_review`
/// is unset; `stability > 0` after the first graduated review;
/// `next_review == last_review + interval_days`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub user_id: Uuid,
    pub problem_id: i64,
    pub state: CardState,
    /// Difficulty in [1, 10].
    pub difficulty: f64,
    /// Memory stability in days, strictly positive once reviewed.
    pub stability: f64,
    pub review_count: i32,
    pub lapses: i32,
    pub last_review: Option<DateTime<Utc>>,
    pub next_review: Option<DateTime<Utc>>,
    pub interval_days: i32,
    /// Grade of the last review, 1..4; 0 when never reviewed.
    pub last_rating: i32,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Card {
    /// Fresh card for a problem the user has never interacted with.
    pub fn new(user_id: Uuid, problem_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            problem_id,
            state: CardState::New,
            difficulty: 0.0,
            stability: 0.0,
            review_count: 0,
            lapses: 0,
            last_review: None,
            next_review: None,
            interval_days: 0,
            last_rating: 0,
            deleted: false,
            created_at: now,
        }
    }

    /// A card is due when it has never been scheduled or its due date passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.next_review {
            Some(due) => due <= now,
            None => self.state == CardState::New,
        }
    }
}

/// Immutable review record, appended on every submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub problem_id: i64,
    pub card_id: Uuid,
    pub rating: i32,
    pub elapsed_days: f64,
    pub review_type: ReviewType,
    pub old_state: CardState,
    pub new_state: CardState,
    pub old_stability: f64,
    pub new_stability: f64,
    pub reviewed_at: DateTime<Utc>,
}

/// Per-user FSRS parameter set. At most one active row per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserParameters {
    pub id: Uuid,
    pub user_id: Uuid,
    pub weights: [f64; 17],
    pub request_retention: f64,
    pub maximum_interval: i32,
    pub is_active: bool,
    pub training_count: i32,
    pub optimized_at: Option<DateTime<Utc>>,
    pub performance_improvement: Option<f64>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// REQUEST CONTEXT
// ============================================================================

/// Per-request routing context derived from the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: Uuid,
    pub tier: Tier,
    pub ab_group: String,
    pub route: String,
    pub prompt_version: String,
    pub trace_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_validation() {
        assert!(Rating::from_i32(0).is_none());
        assert!(Rating::from_i32(5).is_none());
        assert_eq!(Rating::from_i32(1), Some(Rating::Again));
        assert_eq!(Rating::from_i32(4), Some(Rating::Easy));
    }

    #[test]
    fn test_rating_success_threshold() {
        assert!(!Rating::Again.is_success());
        assert!(!Rating::Hard.is_success());
        assert!(Rating::Good.is_success());
        assert!(Rating::Easy.is_success());
    }

    #[test]
    fn test_tier_parse_case_insensitive() {
        assert_eq!(Tier::parse("gold"), Tier::Gold);
        assert_eq!(Tier::parse("GOLD"), Tier::Gold);
        assert_eq!(Tier::parse("unknown"), Tier::Free);
    }

    #[test]
    fn test_card_state_roundtrip() {
        for state in [
            CardState::New,
            CardState::Learning,
            CardState::Review,
            CardState::Relearning,
        ] {
            assert_eq!(CardState::parse(state.as_str()), state);
        }
    }

    #[test]
    fn test_new_card_invariants() {
        let now = Utc::now();
        let card = Card::new(Uuid::new_v4(), 7, now);
        assert_eq!(card.state, CardState::New);
        assert_eq!(card.review_count, 0);
        assert!(card.last_review.is_none());
        assert!(card.is_due(now));
    }

    #[test]
    fn test_card_due_by_next_review() {
        let now = Utc::now();
        let mut card = Card::new(Uuid::new_v4(), 7, now);
        card.state = CardState::Review;
        card.next_review = Some(now - chrono::Duration::days(1));
        assert!(card.is_due(now));

        card.next_review = Some(now + chrono::Duration::days(1));
        assert!(!card.is_due(now));
    }
}
