//! AI recommendation handler.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::middleware::auth::AuthUser;
use codetop_core::recs::assign_ab_group;
use codetop_domain::{LearningObjective, RequestContext};

pub const ROUTE_AI_RECOMMENDATIONS: &str = "ai-recommendations";

const DEFAULT_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub limit: Option<usize>,
    pub objective: Option<String>,
}

/// Personalized problem recommendations. The target user is always the
/// authenticated caller; no userId parameter is accepted.
pub async fn ai_recommendations(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    headers: HeaderMap,
    Query(query): Query<RecommendationQuery>,
) -> impl IntoResponse {
    let trace_id = headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let ctx = RequestContext {
        user_id: auth.user_id,
        tier: auth.tier,
        ab_group: assign_ab_group(auth.user_id, &state.recs_config.ab.groups),
        route: ROUTE_AI_RECOMMENDATIONS.to_string(),
        prompt_version: state.config.prompt_version.clone(),
        trace_id,
    };

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let objective = query.objective.as_deref().map(LearningObjective::parse);

    let response = state.orchestrator.recommend(&ctx, limit, objective).await;

    let mut response_headers = HeaderMap::new();
    set_header(&mut response_headers, "x-chain-id", &response.meta.chain_id);
    set_header(
        &mut response_headers,
        "x-provider-chain",
        &response.meta.chain_hops.join(","),
    );
    if let Some(reason) = &response.meta.fallback_reason {
        set_header(&mut response_headers, "x-fallback-reason", reason);
    }
    set_header(
        &mut response_headers,
        "x-cache-hit",
        if response.meta.cached { "1" } else { "0" },
    );
    set_header(&mut response_headers, "x-trace-id", &response.meta.trace_id);

    (response_headers, Json(response))
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}
