//! Axum route handlers for the Tailoring API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::progress::ProgressView;
use crate::models::tailoring::TailoredResult;
use crate::models::usage::{Tier, UsageSummary};
use crate::state::AppState;
use crate::tailoring::orchestrator::{JobAccepted, ProviderProbe, TailoringRequest};

#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SetTierRequest {
    pub user_id: Uuid,
    pub tier: Tier,
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<String>,
}

/// POST /api/v1/tailoring
///
/// Validates the request, consumes quota, and starts the job in the background.
/// Poll `/progress` for the lifecycle and `/result` for the output. A second
/// request while the job for the same resume is running gets 409.
pub async fn handle_start_tailoring(
    State(state): State<AppState>,
    Json(request): Json<TailoringRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    let accepted = state.tailoring.start(request).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// GET /api/v1/tailoring/:resume_id/progress?user_id=
pub async fn handle_get_progress(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<ProgressView>, AppError> {
    let view = state
        .tailoring
        .progress(resume_id, params.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No tailoring job for resume {resume_id}")))?;
    Ok(Json(view))
}

/// GET /api/v1/tailoring/:resume_id/result?user_id=
pub async fn handle_get_result(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<TailoredResult>, AppError> {
    let result = state
        .tailoring
        .result(resume_id, params.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No tailored result for resume {resume_id}")))?;
    Ok(Json(result))
}

/// GET /api/v1/usage?user_id=
pub async fn handle_get_usage(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<UsageSummary>, AppError> {
    let usage = state.tailoring.quota().usage(params.user_id).await?;
    Ok(Json(usage))
}

/// PUT /api/v1/usage/tier
///
/// Called by the billing integration when a subscription changes.
pub async fn handle_set_tier(
    State(state): State<AppState>,
    Json(request): Json<SetTierRequest>,
) -> Result<Json<UsageSummary>, AppError> {
    let quota = state.tailoring.quota();
    quota.set_tier(request.user_id, request.tier).await?;
    Ok(Json(quota.usage(request.user_id).await?))
}

/// GET /api/v1/providers
pub async fn handle_list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    let providers = state
        .tailoring
        .provider_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    Json(ProvidersResponse { providers })
}

/// POST /api/v1/providers/:name/test
///
/// Diagnostics only: one short call against the named provider, no retries.
pub async fn handle_test_provider(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ProviderProbe>, AppError> {
    let probe = state.tailoring.test_connection(&name).await?;
    Ok(Json(probe))
}
