/// AI recommendation pipeline.
///
/// Layers over the scheduler: segment gating, chain routing, provider
/// execution with rate limits and fallback, hybrid re-ranking, objective
/// mixing, and confidence calibration, all orchestrated behind a single
/// entry point that degrades to scheduler-only output on any failure.
///
/// Pipeline order for one request:
///
/// ToggleGate → cache lookup → CandidateBuilder → UserProfiler →
/// ChainSelector → ProviderChain → HybridRanker → StrategyMixer →
/// ConfidenceCalibrator → cache write
pub mod calibrate;
pub mod candidates;
pub mod chain;
pub mod limiter;
pub mod mixer;
pub mod orchestrator;
pub mod providers;
pub mod ranker;
pub mod select;
pub mod toggle;
pub mod types;

pub use calibrate::ConfidenceCalibrator;
pub use candidates::CandidateBuilder;
pub use chain::{ChainExecutor, ChainOutcome};
pub use limiter::NodeRateLimiters;
pub use mixer::StrategyMixer;
pub use orchestrator::RecommendationOrchestrator;
pub use providers::{scheduler_fallback, ProviderRegistry, RankingProvider};
pub use ranker::HybridRanker;
pub use select::{assign_ab_group, ChainSelector};
pub use toggle::{ToggleDecision, ToggleGate};
pub use types::{FallbackReason, ProblemCandidate, ProviderResult, RankOptions, RankedItem};
