//! Admin observability and operations handlers, guarded by `x-admin-key`.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use uuid::Uuid;

use crate::AppState;
use crate::middleware::auth::AdminApiKey;
use codetop_domain::{DomainError, MetricsResponse, OptimizeParametersResponse};

/// Lock-free counter snapshot.
pub async fn metrics(
    State(state): State<Arc<AppState>>,
    _admin: AdminApiKey,
) -> Json<MetricsResponse> {
    Json(state.metrics.snapshot())
}

/// Operator-triggered parameter fit for one user.
pub async fn optimize_parameters(
    State(state): State<Arc<AppState>>,
    _admin: AdminApiKey,
    Path(user_id): Path<Uuid>,
) -> Result<Json<OptimizeParametersResponse>, DomainError> {
    let response = state
        .optimizer_service
        .optimize_user(user_id, Utc::now())
        .await?;
    Ok(Json(response))
}
