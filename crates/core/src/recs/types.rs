/// Shared types for the recommendation pipeline.
use codetop_domain::ProblemDifficulty;
use serde::{Deserialize, Serialize};

/// One problem in the candidate pool handed to the ranking providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemCandidate {
    pub id: i64,
    pub topic: String,
    pub difficulty: ProblemDifficulty,
    pub tags: Vec<String>,
    pub attempts: i32,
    pub recent_accuracy: f64,
    /// Scheduler urgency in [0, 1]; drives the terminal fallback ordering.
    pub urgency_score: f64,
    /// Modeled recall probability right now.
    pub retention_probability: f64,
    pub days_overdue: f64,
}

/// A ranked item flowing through the pipeline stages. Providers populate
/// score/reason/model; later stages rewrite score, source, and confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedItem {
    pub problem_id: i64,
    pub score: f64,
    pub reason: String,
    pub source: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Options handed to each provider invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankOptions {
    pub limit: usize,
}

/// Successful provider output.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResult {
    pub provider: String,
    pub model: Option<String>,
    pub items: Vec<RankedItem>,
}

/// Why a provider node (or the whole pipeline) was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    GlobalRateLimit,
    UserRateLimit,
    Timeout,
    AdmissionTimeout,
    ProviderError(String),
    ToggleDenied(String),
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::GlobalRateLimit => write!(f, "GLOBAL_RATE_LIMIT"),
            FallbackReason::UserRateLimit => write!(f, "USER_RATE_LIMIT"),
            FallbackReason::Timeout => write!(f, "TIMEOUT"),
            FallbackReason::AdmissionTimeout => write!(f, "ADMISSION_TIMEOUT"),
            FallbackReason::ProviderError(class) => write!(f, "{class}"),
            FallbackReason::ToggleDenied(reason) => write!(f, "{reason}"),
        }
    }
}
