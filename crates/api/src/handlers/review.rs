//! Review handlers: submit, queue, stats.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use crate::middleware::auth::AuthUser;
use codetop_domain::{
    DomainError, ReviewQueueResponse, ReviewStatsResponse, SubmitReviewRequest,
    SubmitReviewResponse,
};

/// Submit a graded review. `X-Request-Id` makes the write idempotent:
/// resubmissions with the same id replay the stored response.
pub async fn submit_review(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(req): Json<SubmitReviewRequest>,
) -> Result<Json<SubmitReviewResponse>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;

    let request_id = headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok());

    let response = state
        .review_service
        .submit(auth.user_id, &req, request_id, Utc::now())
        .await?;

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    pub limit: Option<usize>,
}

/// The user's prioritized review queue.
pub async fn review_queue(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<QueueQuery>,
) -> Result<Json<ReviewQueueResponse>, DomainError> {
    let limit = state.queue_service.effective_limit(query.limit);
    let response = state
        .queue_service
        .queue(auth.user_id, limit, Utc::now())
        .await
        .map_err(|e| {
            tracing::error!(user_id = %auth.user_id, error = %e, "queue assembly failed");
            DomainError::Transient(e.to_string())
        })?;
    Ok(Json(response))
}

/// Card-state counts and review totals.
pub async fn review_stats(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ReviewStatsResponse>, DomainError> {
    let response = state
        .queue_service
        .stats(auth.user_id, Utc::now())
        .await
        .map_err(|e| {
            tracing::error!(user_id = %auth.user_id, error = %e, "stats query failed");
            DomainError::Transient(e.to_string())
        })?;
    Ok(Json(response))
}
