//! CodeTop practice backend server library.

pub mod handlers;
pub mod middleware;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use codetop_config::{AppConfig, RecommendationConfig};
use codetop_core::{
    Metrics, OptimizerService, QueueService, RecommendationOrchestrator, ReviewService,
};
use codetop_domain::{HealthResponse, ReadyResponse};
use codetop_storage::check_connection;
use sqlx::PgPool;

use handlers::admin::{metrics, optimize_parameters};
use handlers::recommendations::ai_recommendations;
use handlers::review::{review_queue, review_stats, submit_review};

/// Application state shared across handlers.
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub recs_config: Arc<RecommendationConfig>,
    pub review_service: Arc<ReviewService>,
    pub queue_service: Arc<QueueService>,
    pub optimizer_service: Arc<OptimizerService>,
    pub orchestrator: Arc<RecommendationOrchestrator>,
    pub metrics: Arc<Metrics>,
    pub start_time: Instant,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/ready", get(ready))
        .route("/api/v1/review/submit", post(submit_review))
        .route("/api/v1/review/queue", get(review_queue))
        .route("/api/v1/review/stats", get(review_stats))
        .route("/api/v1/problems/ai-recommendations", get(ai_recommendations))
        .route("/v1/admin/metrics", get(metrics))
        .route(
            "/v1/admin/users/{user_id}/optimize-parameters",
            post(optimize_parameters),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let uptime = state.start_time.elapsed().as_secs();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build_sha: option_env!("BUILD_SHA").unwrap_or("dev").to_string(),
        uptime_seconds: uptime,
    })
}

/// Readiness check endpoint.
async fn ready(State(state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    let db_status = match check_connection(&state.pool).await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };

    Json(ReadyResponse {
        status: if db_status == "connected" {
            "ok"
        } else {
            "degraded"
        }
        .to_string(),
        database: db_status.to_string(),
    })
}
