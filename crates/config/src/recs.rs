//! Process-wide recommendation and scheduling configuration.
//!
//! Loaded from a JSON file when `RECOMMENDATION_CONFIG_PATH` is set,
//! otherwise built from defaults. Normalized (tier keys uppercased) and
//! validated once at startup; hot reload is out of scope.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::ConfigError;

// ============================================================================
// FSRS DEFAULTS
// ============================================================================

/// Default 17-weight vector for the FSRS v4 model (exponential curve).
pub const DEFAULT_FSRS_WEIGHTS: [f64; 17] = [
    0.4, 0.6, 2.4, 5.8, 4.93, 0.94, 0.86, 0.01, 1.49, 0.14, 0.94, 2.18, 0.05, 0.34, 1.26, 0.29,
    2.61,
];

/// Optimizer clamp domain for each of the 17 weights.
pub const DEFAULT_WEIGHT_BOUNDS: [(f64, f64); 17] = [
    (0.1, 100.0), // w0: initial stability (Again)
    (0.1, 100.0), // w1: initial stability (Hard)
    (0.1, 100.0), // w2: initial stability (Good)
    (0.1, 100.0), // w3: initial stability (Easy)
    (1.0, 10.0),  // w4: initial difficulty base
    (0.1, 5.0),   // w5: initial difficulty grade slope
    (0.1, 5.0),   // w6: difficulty grade delta
    (0.0, 0.75),  // w7: difficulty mean reversion
    (0.0, 4.5),   // w8: stability growth scale (exponent)
    (0.0, 0.8),   // w9: stability saturation
    (0.01, 3.5),  // w10: retrievability gain
    (0.5, 5.0),   // w11: lapse stability scale
    (0.01, 0.25), // w12: lapse difficulty exponent
    (0.01, 0.9),  // w13: lapse stability exponent
    (0.01, 4.0),  // w14: lapse retrievability gain
    (0.0, 1.0),   // w15: hard interval penalty
    (1.0, 6.0),   // w16: easy interval bonus
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FsrsDefaults {
    pub weights: [f64; 17],
    pub request_retention: f64,
    pub maximum_interval: i32,
    pub weight_bounds: Vec<(f64, f64)>,
}

impl Default for FsrsDefaults {
    fn default() -> Self {
        Self {
            weights: DEFAULT_FSRS_WEIGHTS,
            request_retention: 0.9,
            maximum_interval: 36500,
            weight_bounds: DEFAULT_WEIGHT_BOUNDS.to_vec(),
        }
    }
}

// ============================================================================
// SCHEDULER / OPTIMIZER / PROFILER
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueConfig {
    /// Capacity fractions per class; shrink proportionally when underfilled.
    pub new_ratio: f64,
    pub learning_ratio: f64,
    pub review_ratio: f64,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            new_ratio: 0.2,
            learning_ratio: 0.3,
            review_ratio: 0.5,
            default_limit: 20,
            max_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OptimizerConfig {
    /// Minimum usable review logs before a fit runs.
    pub min_reviews: usize,
    /// Window: most recent logs considered.
    pub max_logs: usize,
    pub learning_rate: f64,
    pub max_iterations: usize,
    /// Gradient-norm stopping criterion.
    pub epsilon: f64,
    /// Recency weighting half-life in days.
    pub recency_half_life_days: f64,
    /// New reviews since `optimized_at` before a user is re-eligible.
    pub min_new_reviews: i32,
    /// Users processed per scheduled tick.
    pub batch_users_per_tick: usize,
    /// Seconds between scheduled optimizer ticks.
    pub tick_interval_secs: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            min_reviews: 50,
            max_logs: 2000,
            learning_rate: 0.001,
            max_iterations: 200,
            epsilon: 1e-6,
            recency_half_life_days: 30.0,
            min_new_reviews: 50,
            batch_users_per_tick: 20,
            tick_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfilerConfig {
    pub window_days: i64,
    pub max_logs: usize,
    /// Beta smoothing priors for accuracy.
    pub alpha: f64,
    pub beta: f64,
    pub weak_skill_threshold: f64,
    pub strong_skill_threshold: f64,
    pub min_samples_for_reliability: usize,
    /// Tag → domain mapping; unknown tags fall into `other`.
    pub tag_domains: HashMap<String, String>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            window_days: 90,
            max_logs: 2000,
            alpha: 1.0,
            beta: 1.0,
            weak_skill_threshold: 0.45,
            strong_skill_threshold: 0.75,
            min_samples_for_reliability: 10,
            tag_domains: default_tag_domains(),
        }
    }
}

fn default_tag_domains() -> HashMap<String, String> {
    [
        ("array", "arrays"),
        ("string", "strings"),
        ("hash-table", "hash_tables"),
        ("dynamic-programming", "dynamic_programming"),
        ("memoization", "dynamic_programming"),
        ("tree", "trees"),
        ("binary-tree", "trees"),
        ("binary-search-tree", "trees"),
        ("graph", "graphs"),
        ("depth-first-search", "graphs"),
        ("breadth-first-search", "graphs"),
        ("union-find", "graphs"),
        ("topological-sort", "graphs"),
        ("linked-list", "linked_lists"),
        ("stack", "stacks_queues"),
        ("queue", "stacks_queues"),
        ("monotonic-stack", "stacks_queues"),
        ("heap-priority-queue", "heaps"),
        ("binary-search", "binary_search"),
        ("two-pointers", "two_pointers"),
        ("sliding-window", "sliding_window"),
        ("greedy", "greedy"),
        ("backtracking", "backtracking"),
        ("recursion", "backtracking"),
        ("math", "math"),
        ("bit-manipulation", "bit_manipulation"),
        ("sorting", "sorting"),
        ("prefix-sum", "arrays"),
        ("matrix", "arrays"),
        ("trie", "trees"),
        ("divide-and-conquer", "sorting"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CandidateConfig {
    /// Pool size = min(pool_multiplier * limit, pool_cap).
    pub pool_multiplier: usize,
    pub pool_cap: usize,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            pool_multiplier: 3,
            pool_cap: 50,
        }
    }
}

// ============================================================================
// PROVIDER CHAINS
// ============================================================================

/// What the chain executor does when every node has fallen through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStrategy {
    /// Top-N of the candidate pool by urgency, never fails.
    #[default]
    SchedulerFallback,
    /// "Service busy" sentinel with empty items.
    Busy,
    /// Empty result.
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderNodeConfig {
    pub id: String,
    /// Provider kind registered at startup: "http", "mock".
    pub provider: String,
    pub model: Option<String>,
    pub enabled: bool,
    pub timeout_ms: u64,
    /// Bounded in-node retries after the first attempt.
    pub attempts: u32,
    /// Global tokens per second for this node.
    pub rps: u32,
    /// Tokens per second per (node, user).
    pub per_user_rps: u32,
    /// Error classes that skip to the next node; empty means any.
    pub on_errors_to_next: Vec<String>,
    /// HTTP endpoint for "http" providers.
    pub endpoint: Option<String>,
    /// Environment variable holding the provider API key.
    pub api_key_env: Option<String>,
}

impl Default for ProviderNodeConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            provider: "mock".to_string(),
            model: None,
            enabled: true,
            timeout_ms: 2000,
            attempts: 1,
            rps: 10,
            per_user_rps: 2,
            on_errors_to_next: Vec::new(),
            endpoint: None,
            api_key_env: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChainConfig {
    pub enabled: bool,
    pub nodes: Vec<ProviderNodeConfig>,
    pub terminal: TerminalStrategy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouteConditions {
    /// Matched case-insensitively.
    pub tier: Option<Vec<String>>,
    pub ab_group: Option<Vec<String>>,
    pub route: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRule {
    pub when: RouteConditions,
    pub use_chain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoutingRules {
    pub rules: Vec<RoutingRule>,
    pub default_chain_id: String,
}

impl Default for RoutingRules {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_chain_id: "standard".to_string(),
        }
    }
}

// ============================================================================
// TOGGLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowListMode {
    #[default]
    Off,
    /// Only listed users pass the gate.
    Whitelist,
    /// Listed users bypass every remaining check.
    Override,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToggleConfig {
    pub enabled: bool,
    /// Tier label (uppercased at load) → enabled flag.
    pub by_tier: HashMap<String, bool>,
    pub by_ab_group: HashMap<String, bool>,
    pub by_route: HashMap<String, bool>,
    pub allow_user_ids: HashSet<String>,
    pub deny_user_ids: HashSet<String>,
    pub allow_list_mode: AllowListMode,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            by_tier: HashMap::new(),
            by_ab_group: HashMap::new(),
            by_route: HashMap::new(),
            allow_user_ids: HashSet::new(),
            deny_user_ids: HashSet::new(),
            allow_list_mode: AllowListMode::Off,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AbConfig {
    /// Stable labels; assignment hashes the user id into this list.
    pub groups: Vec<String>,
}

impl Default for AbConfig {
    fn default() -> Self {
        Self {
            groups: vec!["A".to_string(), "B".to_string()],
        }
    }
}

// ============================================================================
// RANKING / MIXING / CALIBRATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HybridWeights {
    pub enabled: bool,
    pub llm: f64,
    pub fsrs: f64,
    pub similarity: f64,
    pub personalization: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            enabled: true,
            llm: 0.45,
            fsrs: 0.30,
            similarity: 0.15,
            personalization: 0.10,
        }
    }
}

/// Slot fractions per strategy category; each table sums to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QuotaTable {
    pub weakness: f64,
    pub progressive: f64,
    pub coverage: f64,
    pub exam: f64,
    pub refresh: f64,
}

impl Default for QuotaTable {
    fn default() -> Self {
        Self {
            weakness: 0.4,
            progressive: 0.25,
            coverage: 0.2,
            exam: 0.1,
            refresh: 0.05,
        }
    }
}

impl QuotaTable {
    pub fn sum(&self) -> f64 {
        self.weakness + self.progressive + self.coverage + self.exam + self.refresh
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MixConfig {
    pub enabled: bool,
    /// Keyed by LearningObjective label (SCREAMING_SNAKE_CASE).
    pub quotas: HashMap<String, QuotaTable>,
}

impl Default for MixConfig {
    fn default() -> Self {
        let mut quotas = HashMap::new();
        quotas.insert(
            "WEAKNESS_FOCUS".to_string(),
            QuotaTable {
                weakness: 0.5,
                progressive: 0.2,
                coverage: 0.15,
                exam: 0.1,
                refresh: 0.05,
            },
        );
        quotas.insert(
            "PROGRESSIVE_DIFFICULTY".to_string(),
            QuotaTable {
                weakness: 0.2,
                progressive: 0.5,
                coverage: 0.15,
                exam: 0.1,
                refresh: 0.05,
            },
        );
        quotas.insert(
            "TOPIC_COVERAGE".to_string(),
            QuotaTable {
                weakness: 0.2,
                progressive: 0.15,
                coverage: 0.5,
                exam: 0.1,
                refresh: 0.05,
            },
        );
        quotas.insert(
            "EXAM_PREP".to_string(),
            QuotaTable {
                weakness: 0.2,
                progressive: 0.15,
                coverage: 0.1,
                exam: 0.5,
                refresh: 0.05,
            },
        );
        quotas.insert(
            "REFRESH_MASTERED".to_string(),
            QuotaTable {
                weakness: 0.15,
                progressive: 0.15,
                coverage: 0.1,
                exam: 0.1,
                refresh: 0.5,
            },
        );
        Self {
            enabled: true,
            quotas,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfidenceWeights {
    pub llm_quality: f64,
    pub fsrs_depth: f64,
    pub profile_relevance: f64,
    pub historical_accuracy: f64,
    pub consensus: f64,
    pub context_quality: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            llm_quality: 0.25,
            fsrs_depth: 0.2,
            profile_relevance: 0.2,
            historical_accuracy: 0.15,
            consensus: 0.1,
            context_quality: 0.1,
        }
    }
}

impl ConfidenceWeights {
    pub fn sum(&self) -> f64 {
        self.llm_quality
            + self.fsrs_depth
            + self.profile_relevance
            + self.historical_accuracy
            + self.consensus
            + self.context_quality
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfidenceConfig {
    pub enabled: bool,
    pub weights: ConfidenceWeights,
    /// Classification thresholds: >= high → High, >= medium → Medium,
    /// >= low → Low, below → Very Low.
    pub high_threshold: f64,
    pub medium_threshold: f64,
    pub low_threshold: f64,
    /// Items below this are dropped from the output.
    pub minimum_show: f64,
    /// Prepend "[<Label> Confidence]" to the item reason.
    pub include_in_reason: bool,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weights: ConfidenceWeights::default(),
            high_threshold: 0.75,
            medium_threshold: 0.5,
            low_threshold: 0.3,
            minimum_show: 0.2,
            include_in_reason: true,
        }
    }
}

// ============================================================================
// ADMISSION / CACHE / IDEMPOTENCY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdmissionConfig {
    pub global_permits: usize,
    pub per_user_permits: usize,
    pub acquire_timeout_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            global_permits: 10,
            per_user_permits: 2,
            acquire_timeout_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheTtlConfig {
    pub user_profile_secs: u64,
    pub fsrs_queue_secs: u64,
    pub fsrs_stats_secs: u64,
    pub fsrs_metrics_secs: u64,
    pub problem_secs: u64,
    pub recommendation_secs: u64,
    /// Delay before the second delete of the double-delete pattern.
    pub double_delete_delay_ms: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            user_profile_secs: 3600,
            fsrs_queue_secs: 300,
            fsrs_stats_secs: 600,
            fsrs_metrics_secs: 3600,
            problem_secs: 1800,
            recommendation_secs: 3600,
            double_delete_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IdempotencyConfig {
    /// An IN_PROGRESS record younger than this rejects duplicates.
    pub in_progress_grace_secs: i64,
    /// Records older than this are purged.
    pub record_ttl_hours: i64,
    pub purge_interval_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            in_progress_grace_secs: 30,
            record_ttl_hours: 24,
            purge_interval_secs: 3600,
        }
    }
}

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecommendationConfig {
    pub toggles: ToggleConfig,
    pub chains: HashMap<String, ChainConfig>,
    pub routing: RoutingRules,
    pub ab: AbConfig,
    pub hybrid: HybridWeights,
    pub mixing: MixConfig,
    pub confidence: ConfidenceConfig,
    pub fsrs: FsrsDefaults,
    pub optimizer: OptimizerConfig,
    pub profiler: ProfilerConfig,
    pub queue: QueueConfig,
    pub candidates: CandidateConfig,
    pub admission: AdmissionConfig,
    pub cache_ttl: CacheTtlConfig,
    pub idempotency: IdempotencyConfig,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        let mut chains = HashMap::new();
        chains.insert(
            "standard".to_string(),
            ChainConfig {
                enabled: true,
                nodes: vec![ProviderNodeConfig {
                    id: "mock-primary".to_string(),
                    ..Default::default()
                }],
                terminal: TerminalStrategy::SchedulerFallback,
            },
        );
        Self {
            toggles: ToggleConfig::default(),
            chains,
            routing: RoutingRules::default(),
            ab: AbConfig::default(),
            hybrid: HybridWeights::default(),
            mixing: MixConfig::default(),
            confidence: ConfidenceConfig::default(),
            fsrs: FsrsDefaults::default(),
            optimizer: OptimizerConfig::default(),
            profiler: ProfilerConfig::default(),
            queue: QueueConfig::default(),
            candidates: CandidateConfig::default(),
            admission: AdmissionConfig::default(),
            cache_ttl: CacheTtlConfig::default(),
            idempotency: IdempotencyConfig::default(),
        }
    }
}

impl RecommendationConfig {
    /// Load from a JSON file when a path is given, otherwise defaults.
    /// Always normalizes and validates before returning.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| ConfigError::Io(p.to_string(), e.to_string()))?;
                serde_json::from_str::<RecommendationConfig>(&raw)
                    .map_err(|e| ConfigError::Validation(e.to_string()))?
            }
            None => RecommendationConfig::default(),
        };
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Uppercase tier keys and tier conditions so lookups are
    /// case-insensitive at runtime.
    fn normalize(&mut self) {
        let by_tier = std::mem::take(&mut self.toggles.by_tier);
        self.toggles.by_tier = by_tier
            .into_iter()
            .map(|(k, v)| (k.to_ascii_uppercase(), v))
            .collect();
        for rule in &mut self.routing.rules {
            if let Some(tiers) = &mut rule.when.tier {
                for t in tiers.iter_mut() {
                    *t = t.to_ascii_uppercase();
                }
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.chains.contains_key(&self.routing.default_chain_id) {
            return Err(ConfigError::Validation(format!(
                "defaultChainId '{}' references no chain",
                self.routing.default_chain_id
            )));
        }
        for rule in &self.routing.rules {
            if !self.chains.contains_key(&rule.use_chain) {
                return Err(ConfigError::Validation(format!(
                    "routing rule references unknown chain '{}'",
                    rule.use_chain
                )));
            }
        }
        for (id, chain) in &self.chains {
            if chain.enabled && !chain.nodes.iter().any(|n| n.enabled) {
                return Err(ConfigError::Validation(format!(
                    "enabled chain '{}' has no enabled nodes",
                    id
                )));
            }
        }
        let hybrid_sum =
            self.hybrid.llm + self.hybrid.fsrs + self.hybrid.similarity + self.hybrid.personalization;
        if (hybrid_sum - 1.0).abs() > 0.01 {
            return Err(ConfigError::Validation(format!(
                "hybrid weights sum to {hybrid_sum}, expected 1.0"
            )));
        }
        for (objective, table) in &self.mixing.quotas {
            if (table.sum() - 1.0).abs() > 0.01 {
                return Err(ConfigError::Validation(format!(
                    "quota table for {objective} sums to {}, expected 1.0",
                    table.sum()
                )));
            }
        }
        let conf_sum = self.confidence.weights.sum();
        if (conf_sum - 1.0).abs() > 0.01 {
            return Err(ConfigError::Validation(format!(
                "confidence weights sum to {conf_sum}, expected 1.0"
            )));
        }
        if !(0.70..=0.97).contains(&self.fsrs.request_retention) {
            return Err(ConfigError::Validation(format!(
                "requestRetention {} outside [0.70, 0.97]",
                self.fsrs.request_retention
            )));
        }
        if self.fsrs.weight_bounds.len() != 17 {
            return Err(ConfigError::Validation(
                "weightBounds must have 17 entries".to_string(),
            ));
        }
        if self.ab.groups.is_empty() {
            return Err(ConfigError::Validation("ab.groups is empty".to_string()));
        }
        let ratio_sum =
            self.queue.new_ratio + self.queue.learning_ratio + self.queue.review_ratio;
        if (ratio_sum - 1.0).abs() > 0.01 {
            return Err(ConfigError::Validation(format!(
                "queue ratios sum to {ratio_sum}, expected 1.0"
            )));
        }
        Ok(())
    }
}
