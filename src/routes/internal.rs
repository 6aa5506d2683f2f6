use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::WorkflowError;
use crate::models::api::{
    CreateJobRequest, NotifyRequest, NotifyResponse, OverrideRequest, TransitionRequest,
};
use crate::models::job::{Job, NewJob};
use crate::models::line_item::{LineItem, NewLineItem};
use crate::models::token::TokenPurpose;
use crate::services::tokens::hash_secret;

pub const INTERNAL_KEY_HEADER: &str = "x-internal-key";

/// Extractor that admits only callers presenting the internal API key.
pub struct InternalCaller;

impl FromRequestParts<AppState> for InternalCaller {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(INTERNAL_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        // Compare digests so the comparison does not short-circuit on a prefix.
        if hash_secret(provided) == hash_secret(&state.internal_api_key) {
            Ok(InternalCaller)
        } else {
            tracing::warn!("Internal route called with a wrong key");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

fn validate<T: Validate<Context = ()>>(request: &T) -> Result<(), WorkflowError> {
    request
        .validate()
        .map_err(|report| WorkflowError::Validation(report.to_string()))
}

#[derive(Debug, Serialize)]
pub struct JobDetail {
    pub job: Job,
    pub line_items: Vec<LineItem>,
}

/// POST /internal/jobs
pub async fn create_job(
    _caller: InternalCaller,
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<Job>), WorkflowError> {
    validate(&request)?;
    let job = state
        .workflow
        .create_job(NewJob {
            campaign_id: request.campaign_id,
            provider_id: request.provider_id,
            manager_id: request.manager_id,
            status: request.status,
            currency: request.currency.to_ascii_uppercase(),
            due_date: request.due_date,
            public_notes: request.public_notes,
            private_notes: request.private_notes,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /internal/jobs/{job_id}
pub async fn get_job(
    _caller: InternalCaller,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobDetail>, WorkflowError> {
    let job = state.workflow.get_job(job_id).await?;
    let line_items = state.store.line_items(job_id).await?;
    Ok(Json(JobDetail { job, line_items }))
}

/// POST /internal/jobs/{job_id}/line-items
pub async fn add_line_item(
    _caller: InternalCaller,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<NewLineItem>,
) -> Result<(StatusCode, Json<LineItem>), WorkflowError> {
    validate(&request)?;
    let item = state.workflow.add_line_item(job_id, request).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// POST /internal/jobs/{job_id}/transitions
pub async fn apply_transition(
    _caller: InternalCaller,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Job>, WorkflowError> {
    let job = state.workflow.apply(job_id, request.command).await?;
    Ok(Json(job))
}

/// POST /internal/jobs/{job_id}/override: privileged, skips entry actions.
pub async fn override_status(
    _caller: InternalCaller,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<OverrideRequest>,
) -> Result<Json<Job>, WorkflowError> {
    validate(&request)?;
    let job = state
        .workflow
        .override_status(job_id, request.status, &request.actor, &request.reason)
        .await?;
    Ok(Json(job))
}

/// POST /internal/jobs/{job_id}/notify: re-announce the current status.
pub async fn notify_status_change(
    _caller: InternalCaller,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<NotifyRequest>,
) -> Result<Json<NotifyResponse>, WorkflowError> {
    let outcome = state
        .workflow
        .notify_status_change(job_id, request.status)
        .await?;
    Ok(Json(NotifyResponse {
        job_id,
        status: request.status,
        outcome,
    }))
}

#[derive(Debug, Deserialize)]
pub struct IssueTokenRequest {
    pub purpose: TokenPurpose,
}

#[derive(Debug, Serialize)]
pub struct IssueTokenResponse {
    pub link: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// POST /internal/jobs/{job_id}/tokens: mint a link by hand.
pub async fn issue_token(
    _caller: InternalCaller,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<IssueTokenRequest>,
) -> Result<Json<IssueTokenResponse>, WorkflowError> {
    let issued = state.workflow.issue_token(job_id, request.purpose).await?;
    Ok(Json(IssueTokenResponse {
        link: state.workflow.link_for(&issued),
        expires_at: issued.expires_at,
    }))
}

/// DELETE /internal/jobs/{job_id}/tokens
pub async fn invalidate_tokens(
    _caller: InternalCaller,
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<StatusCode, WorkflowError> {
    state.workflow.invalidate_tokens(job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
