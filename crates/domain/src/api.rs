//! Request/response DTOs for the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{CardState, ProblemDifficulty};

// ============================================================================
// REVIEW SUBMIT
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReviewRequest {
    pub problem_id: i64,
    /// Self-rating 1..4. Validated again in the scheduler; this bound gives
    /// the caller a 400 before any card is loaded.
    #[validate(range(min = 1, max = 4, message = "rating must be between 1 and 4"))]
    pub rating: i32,
    pub review_type: Option<String>,
    /// Test/backfill override for the elapsed-days clock.
    #[validate(range(min = 0.0, message = "elapsedDays must be non-negative"))]
    pub elapsed_days: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReviewResponse {
    pub card_id: Uuid,
    pub new_state: CardState,
    pub new_stability: f64,
    pub new_difficulty: f64,
    pub interval_days: i32,
    pub next_review_at: DateTime<Utc>,
}

// ============================================================================
// REVIEW QUEUE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCard {
    pub id: Uuid,
    pub problem_id: i64,
    pub problem_title: String,
    pub difficulty: ProblemDifficulty,
    pub state: CardState,
    pub stability: f64,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMeta {
    pub total: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQueueResponse {
    pub due_cards: Vec<QueueCard>,
    pub new_cards: Vec<QueueCard>,
    pub meta: QueueMeta,
}

/// Per-state card counts for the stats endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStatsResponse {
    pub due_now: i64,
    pub new_cards: i64,
    pub learning: i64,
    pub review: i64,
    pub relearning: i64,
    pub total_reviews: i64,
}

// ============================================================================
// AI RECOMMENDATIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationItem {
    pub problem_id: i64,
    pub reason: String,
    pub score: f64,
    pub confidence: f64,
    /// Origin plus the mixing category that placed the item,
    /// e.g. "HYBRID:weakness".
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationMeta {
    pub trace_id: String,
    pub generated_at: DateTime<Utc>,
    pub cached: bool,
    pub strategy: String,
    pub chain_id: String,
    pub chain_hops: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busy: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub items: Vec<RecommendationItem>,
    pub meta: RecommendationMeta,
}

// ============================================================================
// PARAMETER OPTIMIZATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedParameters {
    pub weights: Vec<f64>,
    pub request_retention: f64,
    pub training_count: i32,
    pub performance_improvement: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeParametersResponse {
    pub optimized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<OptimizedParameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ============================================================================
// ADMIN METRICS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub chain_selections: u64,
    pub provider_fallbacks: u64,
    pub scheduler_fallbacks: u64,
    pub corrupt_card_recoveries: u64,
    pub admission_timeouts: u64,
}
