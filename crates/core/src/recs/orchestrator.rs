/// Top-level recommendation entry point.
///
/// Wires gate → cache → admission → candidates → profile → chain →
/// ranker → mixer → calibrator under one request context. This is the only
/// component the API layer calls, and it never returns an error: every
/// deny, timeout, or internal failure downgrades to scheduler-only output
/// with the reason recorded in the response meta.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use codetop_config::CacheTtlConfig;
use codetop_domain::{
    LearningObjective, RecommendationItem, RecommendationMeta, RecommendationResponse,
    RequestContext,
};

use super::calibrate::ConfidenceCalibrator;
use super::candidates::CandidateBuilder;
use super::chain::ChainExecutor;
use super::mixer::StrategyMixer;
use super::providers::scheduler_fallback;
use super::ranker::HybridRanker;
use super::select::ChainSelector;
use super::toggle::{ToggleDecision, ToggleGate};
use super::types::{FallbackReason, ProblemCandidate, RankOptions, RankedItem};
use crate::admission::AdmissionControl;
use crate::cache::{keys, CacheStore};
use crate::metrics::Metrics;
use crate::ports::{CardRepository, ProblemRepository};
use crate::services::ProfileService;

/// Hard ceiling on the requested output size.
const MAX_LIMIT: usize = 20;
/// Stability above which a card counts as mastered for similarity.
const MASTERED_MIN_STABILITY: f64 = 21.0;
const MASTERED_SAMPLE: u32 = 20;

const STRATEGY_FALLBACK: &str = "FSRS_FALLBACK";
const STRATEGY_BUSY: &str = "BUSY";

pub struct RecommendationOrchestrator {
    toggle: ToggleGate,
    selector: ChainSelector,
    executor: ChainExecutor,
    builder: Arc<CandidateBuilder>,
    profiles: Arc<ProfileService>,
    cards: Arc<dyn CardRepository>,
    problems: Arc<dyn ProblemRepository>,
    ranker: HybridRanker,
    mixer: StrategyMixer,
    calibrator: ConfidenceCalibrator,
    cache: CacheStore,
    admission: Arc<AdmissionControl>,
    metrics: Arc<Metrics>,
    ttl: Duration,
}

#[allow(clippy::too_many_arguments)]
impl RecommendationOrchestrator {
    pub fn new(
        toggle: ToggleGate,
        selector: ChainSelector,
        executor: ChainExecutor,
        builder: Arc<CandidateBuilder>,
        profiles: Arc<ProfileService>,
        cards: Arc<dyn CardRepository>,
        problems: Arc<dyn ProblemRepository>,
        ranker: HybridRanker,
        mixer: StrategyMixer,
        calibrator: ConfidenceCalibrator,
        cache: CacheStore,
        admission: Arc<AdmissionControl>,
        metrics: Arc<Metrics>,
        ttl_config: &CacheTtlConfig,
    ) -> Self {
        Self {
            toggle,
            selector,
            executor,
            builder,
            profiles,
            cards,
            problems,
            ranker,
            mixer,
            calibrator,
            cache,
            admission,
            metrics,
            ttl: Duration::from_secs(ttl_config.recommendation_secs),
        }
    }

    pub async fn recommend(
        &self,
        ctx: &RequestContext,
        limit: usize,
        objective: Option<LearningObjective>,
    ) -> RecommendationResponse {
        let limit = limit.clamp(1, MAX_LIMIT);
        let objective = objective.unwrap_or_default();

        // Selection is pure config evaluation; its result is part of the
        // cache key, so it runs before the lookup.
        let selection = self.selector.select(ctx);
        let chain_id = selection
            .as_ref()
            .map(|(id, _)| (*id).to_string())
            .unwrap_or_else(|| "none".to_string());

        if let ToggleDecision::Deny { reason } = self.toggle.decide(ctx) {
            return self
                .scheduler_only(ctx, limit, &chain_id, FallbackReason::ToggleDenied(reason))
                .await;
        }

        let cache_key = keys::recommendation(
            ctx.user_id,
            limit,
            &ctx.prompt_version,
            ctx.tier.as_str(),
            &ctx.ab_group,
            &chain_id,
        );
        if let Some(mut cached) = self.cache.get::<RecommendationResponse>(&cache_key) {
            cached.meta.cached = true;
            cached.meta.trace_id = ctx.trace_id.clone();
            return cached;
        }

        let _guard = match self.admission.acquire(ctx.user_id).await {
            Ok(guard) => guard,
            Err(_) => {
                self.metrics.record_admission_timeout();
                return self
                    .scheduler_only(ctx, limit, &chain_id, FallbackReason::AdmissionTimeout)
                    .await;
            }
        };

        match self.pipeline(ctx, limit, objective, &chain_id, selection).await {
            Ok(response) => {
                self.cache.put(&cache_key, &response, self.ttl);
                response
            }
            Err(error) => {
                tracing::error!(
                    user_id = %ctx.user_id,
                    trace_id = %ctx.trace_id,
                    %error,
                    "recommendation pipeline failed, downgrading to scheduler output"
                );
                self.scheduler_only(
                    ctx,
                    limit,
                    &chain_id,
                    FallbackReason::ProviderError("Internal".to_string()),
                )
                .await
            }
        }
    }

    async fn pipeline(
        &self,
        ctx: &RequestContext,
        limit: usize,
        objective: LearningObjective,
        chain_id: &str,
        selection: Option<(&str, &codetop_config::ChainConfig)>,
    ) -> anyhow::Result<RecommendationResponse> {
        let now = Utc::now();
        let candidates = self.builder.build(ctx.user_id, limit, now).await?;
        let candidate_map: HashMap<i64, ProblemCandidate> =
            candidates.iter().map(|c| (c.id, c.clone())).collect();

        let Some((_, chain)) = selection else {
            // No usable chain anywhere: terminal default answers directly.
            let items = scheduler_fallback(&candidates, limit);
            self.metrics.record_scheduler_fallback();
            return Ok(self.response(
                ctx,
                items,
                STRATEGY_FALLBACK,
                chain_id,
                Vec::new(),
                Some("NO_USABLE_CHAIN".to_string()),
                None,
            ));
        };

        let profile = self.profiles.get(ctx.user_id, now).await?;
        let mastered = self.mastered_tag_sets(ctx).await?;

        self.metrics.record_chain_selection();
        let outcome = self
            .executor
            .execute(chain_id, chain, ctx, &candidates, &RankOptions { limit })
            .await;

        if outcome.busy {
            return Ok(self.response(
                ctx,
                Vec::new(),
                STRATEGY_BUSY,
                chain_id,
                outcome.hops,
                outcome.fallback_reason,
                Some(true),
            ));
        }
        if outcome.from_terminal {
            // Scheduler-ranked already; the hybrid stages only apply to
            // model output.
            return Ok(self.response(
                ctx,
                outcome.items,
                STRATEGY_FALLBACK,
                chain_id,
                outcome.hops,
                outcome.fallback_reason,
                None,
            ));
        }

        let ranked = self
            .ranker
            .rank(outcome.items, &candidate_map, &profile, &mastered);
        let mixed = self
            .mixer
            .mix(ranked, &candidate_map, &profile, objective, limit);
        let calibrated = self.calibrator.calibrate(mixed, &candidate_map, &profile);

        Ok(self.response(
            ctx,
            calibrated,
            objective.as_str(),
            chain_id,
            outcome.hops,
            None,
            None,
        ))
    }

    /// Scheduler-only answer for deny/timeout/failure paths. Candidate
    /// assembly itself degrading returns an empty list rather than an error.
    async fn scheduler_only(
        &self,
        ctx: &RequestContext,
        limit: usize,
        chain_id: &str,
        reason: FallbackReason,
    ) -> RecommendationResponse {
        let candidates = match self.builder.build(ctx.user_id, limit, Utc::now()).await {
            Ok(candidates) => candidates,
            Err(error) => {
                tracing::error!(
                    user_id = %ctx.user_id,
                    trace_id = %ctx.trace_id,
                    %error,
                    "candidate assembly failed during fallback"
                );
                Vec::new()
            }
        };
        let items = scheduler_fallback(&candidates, limit);
        self.metrics.record_scheduler_fallback();
        self.response(
            ctx,
            items,
            STRATEGY_FALLBACK,
            chain_id,
            Vec::new(),
            Some(reason.to_string()),
            None,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn response(
        &self,
        ctx: &RequestContext,
        items: Vec<RankedItem>,
        strategy: &str,
        chain_id: &str,
        chain_hops: Vec<String>,
        fallback_reason: Option<String>,
        busy: Option<bool>,
    ) -> RecommendationResponse {
        RecommendationResponse {
            items: items
                .into_iter()
                .map(|item| RecommendationItem {
                    problem_id: item.problem_id,
                    reason: item.reason,
                    score: item.score,
                    confidence: item.confidence,
                    source: item.source,
                    model: item.model,
                })
                .collect(),
            meta: RecommendationMeta {
                trace_id: ctx.trace_id.clone(),
                generated_at: Utc::now(),
                cached: false,
                strategy: strategy.to_string(),
                chain_id: chain_id.to_string(),
                chain_hops,
                fallback_reason,
                busy,
            },
        }
    }

    /// Tag sets of the user's most stable (mastered) problems.
    async fn mastered_tag_sets(&self, ctx: &RequestContext) -> anyhow::Result<Vec<Vec<String>>> {
        let mastered = self
            .cards
            .list_mastered(ctx.user_id, MASTERED_MIN_STABILITY, MASTERED_SAMPLE)
            .await?;
        if mastered.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = mastered.iter().map(|card| card.problem_id).collect();
        let problems = self.problems.get_many(&ids).await?;
        Ok(problems.into_iter().map(|p| p.tags).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionControl;
    use crate::ports::{
        MockCardRepository, MockProblemRepository, MockReviewLogRepository,
    };
    use crate::profile::UserProfiler;
    use crate::recs::limiter::NodeRateLimiters;
    use crate::recs::providers::ProviderRegistry;
    use chrono::Duration as ChronoDuration;
    use codetop_config::{
        AdmissionConfig, CandidateConfig, ChainConfig, ProfilerConfig, ProviderNodeConfig,
        QueueConfig, RecommendationConfig, RouteConditions, RoutingRule, TerminalStrategy,
    };
    use codetop_domain::{Card, CardState, Problem, ProblemDifficulty, Tier};
    use uuid::Uuid;

    fn problem(id: i64) -> Problem {
        Problem {
            id,
            title: format!("Problem {id}"),
            difficulty: ProblemDifficulty::Medium,
            tags: vec!["array".to_string()],
            categories: vec!["arrays".to_string()],
            deleted: false,
            created_at: Utc::now(),
        }
    }

    fn due_card(user: Uuid, problem_id: i64) -> Card {
        let now = Utc::now();
        let mut card = Card::new(user, problem_id, now);
        card.state = CardState::Review;
        card.stability = 8.0;
        card.difficulty = 5.0;
        card.review_count = 3;
        card.last_review = Some(now - ChronoDuration::days(10));
        card.next_review = Some(now - ChronoDuration::days(problem_id));
        card
    }

    fn ctx(tier: Tier) -> RequestContext {
        RequestContext {
            user_id: Uuid::from_u128(1),
            tier,
            ab_group: "A".to_string(),
            route: "ai-recommendations".to_string(),
            prompt_version: "v3".to_string(),
            trace_id: "trace-1".to_string(),
        }
    }

    fn config_with_premium_rule() -> RecommendationConfig {
        let mut config = RecommendationConfig::default();
        config.chains.insert(
            "premium".to_string(),
            ChainConfig {
                enabled: true,
                nodes: vec![ProviderNodeConfig {
                    id: "mock-premium".to_string(),
                    model: Some("mock-xl".to_string()),
                    rps: 0,
                    per_user_rps: 0,
                    ..Default::default()
                }],
                terminal: TerminalStrategy::SchedulerFallback,
            },
        );
        config.routing.rules.push(RoutingRule {
            when: RouteConditions {
                tier: Some(vec!["GOLD".to_string(), "PLATINUM".to_string()]),
                ab_group: None,
                route: None,
            },
            use_chain: "premium".to_string(),
        });
        // Default chain nodes must not rate-limit in tests, and borderline
        // confidence scores must not flap the assertions.
        for chain in config.chains.values_mut() {
            for node in &mut chain.nodes {
                node.rps = 0;
                node.per_user_rps = 0;
            }
        }
        config.confidence.minimum_show = 0.05;
        config
    }

    fn orchestrator(config: RecommendationConfig) -> RecommendationOrchestrator {
        let metrics = Arc::new(Metrics::new());
        let cache = CacheStore::new(Arc::clone(&metrics));

        let mut cards = MockCardRepository::new();
        cards
            .expect_list_due()
            .withf(|_, states, _, _| states.contains(&CardState::Learning))
            .returning(|_, _, _, _| Ok(vec![]));
        cards
            .expect_list_due()
            .withf(|_, states, _, _| states.contains(&CardState::Review))
            .returning(|user, _, _, _| {
                Ok((1..=5).map(|id| due_card(user, id)).collect())
            });
        cards
            .expect_list_mastered()
            .returning(|_, _, _| Ok(vec![]));
        let cards: Arc<dyn CardRepository> = Arc::new(cards);

        let mut problems = MockProblemRepository::new();
        problems.expect_list_unseen().returning(|_, _| Ok(vec![problem(10)]));
        problems
            .expect_get_many()
            .returning(|ids| Ok(ids.iter().map(|id| problem(*id)).collect()));
        let problems: Arc<dyn ProblemRepository> = Arc::new(problems);

        let mut logs = MockReviewLogRepository::new();
        logs.expect_list_recent().returning(|_, _, _| Ok(vec![]));
        let logs: Arc<dyn ReviewLogRepository> = Arc::new(logs);

        let builder = Arc::new(CandidateBuilder::new(
            Arc::clone(&cards),
            Arc::clone(&problems),
            Arc::clone(&logs),
            CandidateConfig::default(),
            QueueConfig::default(),
        ));
        let profiles = Arc::new(ProfileService::new(
            Arc::clone(&logs),
            Arc::clone(&problems),
            UserProfiler::new(ProfilerConfig::default()),
            cache.clone(),
            &config.cache_ttl,
        ));

        let registry = ProviderRegistry::from_nodes(
            config.chains.values().flat_map(|chain| chain.nodes.iter()),
        );
        let executor = ChainExecutor::new(
            Arc::new(registry),
            Arc::new(NodeRateLimiters::new()),
            Arc::clone(&metrics),
        );

        RecommendationOrchestrator::new(
            ToggleGate::new(config.toggles.clone()),
            ChainSelector::new(config.clone()),
            executor,
            builder,
            profiles,
            cards,
            problems,
            HybridRanker::new(config.hybrid.clone(), config.profiler.clone()),
            StrategyMixer::new(config.mixing.clone(), config.profiler.clone()),
            ConfidenceCalibrator::new(config.confidence.clone()),
            cache,
            Arc::new(AdmissionControl::new(&AdmissionConfig::default())),
            metrics,
            &config.cache_ttl,
        )
    }

    use crate::ports::ReviewLogRepository;

    #[tokio::test]
    async fn test_tier_deny_downgrades_to_scheduler_output() {
        let mut config = config_with_premium_rule();
        config.toggles.by_tier.insert("FREE".to_string(), false);
        let orchestrator = orchestrator(config);

        let response = orchestrator.recommend(&ctx(Tier::Free), 3, None).await;
        assert!(!response.items.is_empty());
        assert!(response.items.iter().all(|item| item.source == "FSRS"));
        assert!(response
            .meta
            .fallback_reason
            .as_deref()
            .unwrap()
            .starts_with("TIER_DISABLED"));
        assert_eq!(response.meta.strategy, "FSRS_FALLBACK");
    }

    #[tokio::test]
    async fn test_gold_user_routes_to_premium_chain() {
        let orchestrator = orchestrator(config_with_premium_rule());
        let response = orchestrator.recommend(&ctx(Tier::Gold), 3, None).await;

        assert_eq!(response.meta.chain_id, "premium");
        assert!(!response.items.is_empty());
        assert!(response.meta.fallback_reason.is_none());
        assert_eq!(response.meta.chain_hops, vec!["mock-premium:OK"]);
    }

    #[tokio::test]
    async fn test_successful_pipeline_produces_hybrid_items() {
        let orchestrator = orchestrator(config_with_premium_rule());
        let response = orchestrator
            .recommend(&ctx(Tier::Gold), 3, Some(LearningObjective::WeaknessFocus))
            .await;

        assert_eq!(response.meta.strategy, "WEAKNESS_FOCUS");
        assert!(response.items.len() <= 3);
        for item in &response.items {
            assert!(item.source.starts_with("HYBRID"), "source: {}", item.source);
            assert!(item.confidence > 0.0);
            assert!(item.score >= 0.0 && item.score <= 1.0);
        }
    }

    #[tokio::test]
    async fn test_second_call_serves_cache() {
        let orchestrator = orchestrator(config_with_premium_rule());
        let context = ctx(Tier::Gold);

        let first = orchestrator.recommend(&context, 3, None).await;
        assert!(!first.meta.cached);

        let second = orchestrator.recommend(&context, 3, None).await;
        assert!(second.meta.cached);
        assert_eq!(
            first.items.iter().map(|i| i.problem_id).collect::<Vec<_>>(),
            second.items.iter().map(|i| i.problem_id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_different_limits_do_not_share_cache() {
        let orchestrator = orchestrator(config_with_premium_rule());
        let context = ctx(Tier::Gold);

        let _ = orchestrator.recommend(&context, 3, None).await;
        let other = orchestrator.recommend(&context, 5, None).await;
        assert!(!other.meta.cached);
    }

    #[tokio::test]
    async fn test_never_errors_even_when_repositories_fail() {
        let config = config_with_premium_rule();
        let metrics = Arc::new(Metrics::new());
        let cache = CacheStore::new(Arc::clone(&metrics));

        let mut cards = MockCardRepository::new();
        cards
            .expect_list_due()
            .returning(|_, _, _, _| Err(anyhow::anyhow!("db down")));
        cards.expect_list_mastered().returning(|_, _, _| Ok(vec![]));
        let cards: Arc<dyn CardRepository> = Arc::new(cards);

        let mut problems = MockProblemRepository::new();
        problems.expect_list_unseen().returning(|_, _| Ok(vec![]));
        problems.expect_get_many().returning(|_| Ok(vec![]));
        let problems: Arc<dyn ProblemRepository> = Arc::new(problems);

        let mut logs = MockReviewLogRepository::new();
        logs.expect_list_recent().returning(|_, _, _| Ok(vec![]));
        let logs: Arc<dyn ReviewLogRepository> = Arc::new(logs);

        let builder = Arc::new(CandidateBuilder::new(
            Arc::clone(&cards),
            Arc::clone(&problems),
            Arc::clone(&logs),
            CandidateConfig::default(),
            QueueConfig::default(),
        ));
        let profiles = Arc::new(ProfileService::new(
            Arc::clone(&logs),
            Arc::clone(&problems),
            UserProfiler::new(ProfilerConfig::default()),
            cache.clone(),
            &config.cache_ttl,
        ));
        let registry = ProviderRegistry::from_nodes(
            config.chains.values().flat_map(|chain| chain.nodes.iter()),
        );
        let executor = ChainExecutor::new(
            Arc::new(registry),
            Arc::new(NodeRateLimiters::new()),
            Arc::clone(&metrics),
        );
        let orchestrator = RecommendationOrchestrator::new(
            ToggleGate::new(config.toggles.clone()),
            ChainSelector::new(config.clone()),
            executor,
            builder,
            profiles,
            cards,
            problems,
            HybridRanker::new(config.hybrid.clone(), config.profiler.clone()),
            StrategyMixer::new(config.mixing.clone(), config.profiler.clone()),
            ConfidenceCalibrator::new(config.confidence.clone()),
            cache,
            Arc::new(AdmissionControl::new(&AdmissionConfig::default())),
            metrics,
            &config.cache_ttl,
        );

        let response = orchestrator.recommend(&ctx(Tier::Gold), 3, None).await;
        assert!(response.items.is_empty());
        assert!(response.meta.fallback_reason.is_some());
    }
}
