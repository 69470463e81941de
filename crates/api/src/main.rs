//! CodeTop practice backend server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use codetop_api::{AppState, build_router};
use codetop_config::{AppConfig, RecommendationConfig};
use codetop_core::{
    AdmissionControl, CacheInvalidator, CacheStore, CandidateBuilder, ChainExecutor,
    ChainSelector, ConfidenceCalibrator, EventBus, HybridRanker, IdempotencyService, Metrics,
    NodeRateLimiters, OptimizerService, ParameterOptimizer, ProfileService, ProviderRegistry,
    QueueService, RecommendationOrchestrator, ReviewService, StrategyMixer, ToggleGate,
    UserProfiler,
};
use codetop_core::ports::{
    CardRepository, IdempotencyRepository, ParameterRepository, ProblemRepository,
    ReviewLogRepository,
};
use codetop_storage::{
    PgCardRepository, PgIdempotencyRepository, PgParameterRepository, PgProblemRepository,
    PgReviewLogRepository, create_pool, run_migrations,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CodeTop practice backend...");

    // Load configuration
    let config = AppConfig::from_env()?;
    let recs_config = Arc::new(RecommendationConfig::load(
        config.recommendation_config_path.as_deref(),
    )?);
    tracing::info!(
        chains = recs_config.chains.len(),
        rules = recs_config.routing.rules.len(),
        "Recommendation config loaded and validated"
    );

    // Create database pool
    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection pool created");

    // Run migrations
    run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    // Repositories
    let cards: Arc<dyn CardRepository> = Arc::new(PgCardRepository::new(pool.clone()));
    let logs: Arc<dyn ReviewLogRepository> = Arc::new(PgReviewLogRepository::new(pool.clone()));
    let problems: Arc<dyn ProblemRepository> = Arc::new(PgProblemRepository::new(pool.clone()));
    let parameters: Arc<dyn ParameterRepository> =
        Arc::new(PgParameterRepository::new(pool.clone()));
    let idempotency_repo: Arc<dyn IdempotencyRepository> =
        Arc::new(PgIdempotencyRepository::new(pool.clone()));

    // Cross-cutting infrastructure
    let metrics = Arc::new(Metrics::new());
    let cache = CacheStore::new(Arc::clone(&metrics));
    let bus = EventBus::new();
    let _invalidator = CacheInvalidator::new(
        cache.clone(),
        Duration::from_millis(recs_config.cache_ttl.double_delete_delay_ms),
    )
    .spawn(&bus);

    let admission = Arc::new(AdmissionControl::new(&recs_config.admission));
    let idempotency = Arc::new(IdempotencyService::new(
        Arc::clone(&idempotency_repo),
        recs_config.idempotency.clone(),
    ));

    // Scheduler services
    let review_service = Arc::new(ReviewService::new(
        Arc::clone(&cards),
        Arc::clone(&problems),
        Arc::clone(&parameters),
        Arc::clone(&idempotency),
        bus.clone(),
        Arc::clone(&metrics),
        recs_config.fsrs.clone(),
    ));
    let queue_service = Arc::new(QueueService::new(
        Arc::clone(&cards),
        Arc::clone(&problems),
        Arc::clone(&logs),
        cache.clone(),
        recs_config.queue.clone(),
        &recs_config.cache_ttl,
    ));
    let optimizer_service = Arc::new(OptimizerService::new(
        Arc::clone(&logs),
        Arc::clone(&parameters),
        ParameterOptimizer::new(recs_config.optimizer.clone(), recs_config.fsrs.clone()),
        recs_config.fsrs.clone(),
        bus.clone(),
    ));

    // Recommendation pipeline
    let registry = ProviderRegistry::from_nodes(
        recs_config
            .chains
            .values()
            .flat_map(|chain| chain.nodes.iter()),
    );
    let executor = ChainExecutor::new(
        Arc::new(registry),
        Arc::new(NodeRateLimiters::new()),
        Arc::clone(&metrics),
    );
    let builder = Arc::new(CandidateBuilder::new(
        Arc::clone(&cards),
        Arc::clone(&problems),
        Arc::clone(&logs),
        recs_config.candidates.clone(),
        recs_config.queue.clone(),
    ));
    let profiles = Arc::new(ProfileService::new(
        Arc::clone(&logs),
        Arc::clone(&problems),
        UserProfiler::new(recs_config.profiler.clone()),
        cache.clone(),
        &recs_config.cache_ttl,
    ));
    let orchestrator = Arc::new(RecommendationOrchestrator::new(
        ToggleGate::new(recs_config.toggles.clone()),
        ChainSelector::new((*recs_config).clone()),
        executor,
        builder,
        profiles,
        Arc::clone(&cards),
        Arc::clone(&problems),
        HybridRanker::new(recs_config.hybrid.clone(), recs_config.profiler.clone()),
        StrategyMixer::new(recs_config.mixing.clone(), recs_config.profiler.clone()),
        ConfidenceCalibrator::new(recs_config.confidence.clone()),
        cache.clone(),
        Arc::clone(&admission),
        Arc::clone(&metrics),
        &recs_config.cache_ttl,
    ));

    // Background jobs: scheduled re-optimization and idempotency purge.
    spawn_optimizer_tick(
        Arc::clone(&optimizer_service),
        recs_config.optimizer.tick_interval_secs,
    );
    spawn_idempotency_purge(
        Arc::clone(&idempotency),
        recs_config.idempotency.purge_interval_secs,
    );

    // Create app state
    let state = Arc::new(AppState {
        pool,
        config: config.clone(),
        recs_config,
        review_service,
        queue_service,
        optimizer_service,
        orchestrator,
        metrics,
        start_time: Instant::now(),
    });

    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("Server listening on {}", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_optimizer_tick(service: Arc<OptimizerService>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(60)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let processed = service.run_scheduled_tick(Utc::now()).await;
            if processed > 0 {
                tracing::info!(processed, "scheduled optimization tick complete");
            }
        }
    });
}

fn spawn_idempotency_purge(service: Arc<IdempotencyService>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(60)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match service.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "idempotency records purged"),
                Err(error) => tracing::warn!(%error, "idempotency purge failed"),
            }
        }
    });
}
