//! Routes reachable by unauthenticated providers and payers. Every token
//! failure answers with the same generic message.

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::{PublicError, WorkflowError};
use crate::models::api::{
    AccessQuery, AccessResponse, ConfirmPaymentRequest, ConfirmPaymentResponse, TokenQuery,
    UploadResponse,
};
use crate::services::ingestion::UploadedFile;

const INVALID_REASON: &str = "invalid_or_expired";

/// GET /api/v1/public/jobs/{job_id}/access: can this link be used right now?
pub async fn validate_access(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<AccessQuery>,
) -> Result<Json<AccessResponse>, PublicError> {
    match state
        .workflow
        .validate_access(job_id, &query.token, query.purpose)
        .await
    {
        Ok(summary) => Ok(Json(AccessResponse {
            valid: true,
            job: Some(summary),
            reason: None,
        })),
        Err(WorkflowError::InvalidOrExpired | WorkflowError::JobNotFound(_)) => {
            Ok(Json(AccessResponse {
                valid: false,
                job: None,
                reason: Some(INVALID_REASON.to_string()),
            }))
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /api/v1/public/jobs/{job_id}/documents: multipart upload of one or
/// more `file` parts. The token comes from the query string or a `token` part.
pub async fn upload_documents(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<TokenQuery>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, PublicError> {
    let mut token = query.token;
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| WorkflowError::Validation(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("token") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| WorkflowError::Validation(e.body_text()))?;
                token = Some(text);
            }
            Some("file") | Some("files") | Some("file[]") => {
                let file_name = field.file_name().unwrap_or("document").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| WorkflowError::Validation(e.body_text()))?;
                files.push(UploadedFile {
                    file_name,
                    content_type,
                    data: data.to_vec(),
                });
            }
            _ => {}
        }
    }

    let token = token.ok_or(WorkflowError::InvalidOrExpired)?;
    let receipt = state
        .workflow
        .upload_documents(job_id, &token, files)
        .await?;

    Ok(Json(UploadResponse {
        success: true,
        file_urls: Some(receipt.file_urls),
        error: None,
        failed_files: Vec::new(),
    }))
}

/// POST /api/v1/public/jobs/{job_id}/payment: payer confirms payment.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<ConfirmPaymentResponse>, PublicError> {
    if request.validate().is_err() {
        return Err(WorkflowError::InvalidOrExpired.into());
    }

    state
        .workflow
        .confirm_payment(job_id, &request.token)
        .await?;

    Ok(Json(ConfirmPaymentResponse {
        success: true,
        error: None,
    }))
}
