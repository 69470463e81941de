pub mod admission;
pub mod cache;
pub mod events;
pub mod fsrs;
pub mod idempotency;
pub mod metrics;
pub mod optimizer;
pub mod ports;
pub mod profile;
pub mod recs;
pub mod services;

// Re-export commonly used types
pub use admission::{AdmissionControl, AdmissionError, AdmissionGuard};
pub use cache::{keys, CacheInvalidator, CacheStore};
pub use events::EventBus;
pub use fsrs::{assemble_queue, FsrsEngine, ReviewOutcome, ReviewQueue, SchedulerParams};
pub use idempotency::{BeginOutcome, IdempotencyService};
pub use metrics::Metrics;
pub use optimizer::{FitError, FitResult, ParameterOptimizer};
pub use ports::{
    CardRepository, IdempotencyRepository, ParameterRepository, ProblemRepository,
    ReviewLogRepository, StateCounts,
};
pub use profile::{
    DomainSkill, LearningPattern, SkillStrength, TrendDirection, UserProfile, UserProfiler,
};
pub use recs::{
    assign_ab_group, CandidateBuilder, ChainExecutor, ChainSelector, ConfidenceCalibrator,
    FallbackReason, HybridRanker, NodeRateLimiters, ProblemCandidate, ProviderRegistry,
    RankedItem, RecommendationOrchestrator, StrategyMixer, ToggleDecision, ToggleGate,
};
pub use services::{
    OptimizationOutcome, OptimizerService, ProfileService, QueueService, ReviewService,
};
