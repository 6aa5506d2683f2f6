use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::db::StoreError;
use crate::services::state_machine::TransitionRejected;
use crate::services::tokens::TokenError;

/// Message shown to anonymous callers for every token failure.
pub const INVALID_LINK_MESSAGE: &str = "this link is invalid or has expired";

/// Message shown to anonymous callers when the job is not at their step.
pub const NOT_READY_MESSAGE: &str = "this job is not ready for this step";

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("invalid transition: {0}")]
    InvalidTransition(#[from] TransitionRejected),

    /// Covers unauthorized, mismatched, consumed and expired tokens alike.
    #[error("{}", INVALID_LINK_MESSAGE)]
    InvalidOrExpired,

    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("no files were submitted")]
    NoFiles,

    #[error("{} file(s) could not be stored", failed.len())]
    UploadFailed { failed: Vec<String> },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::JobNotFound(id) => WorkflowError::JobNotFound(id),
            StoreError::Overflow(detail) => WorkflowError::Validation(detail),
            other => WorkflowError::Storage(other),
        }
    }
}

impl From<TokenError> for WorkflowError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Rejected(_) => WorkflowError::InvalidOrExpired,
            TokenError::StatusChanged { current, expected } => WorkflowError::Validation(
                format!("job is in {current}, not {expected}"),
            ),
            TokenError::Store(e) => e.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed_files: Vec<String>,
}

impl WorkflowError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WorkflowError::InvalidTransition(_) => StatusCode::CONFLICT,
            WorkflowError::InvalidOrExpired => StatusCode::UNAUTHORIZED,
            WorkflowError::JobNotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::NoFiles | WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
            WorkflowError::UploadFailed { .. } | WorkflowError::Storage(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error, failed_files) = match self {
            WorkflowError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure");
                ("temporarily unavailable, please retry".to_string(), Vec::new())
            }
            WorkflowError::UploadFailed { failed } => (
                "some files could not be stored, please retry them".to_string(),
                failed,
            ),
            other => (other.to_string(), Vec::new()),
        };

        (
            status,
            Json(ErrorBody {
                success: false,
                error,
                failed_files,
            }),
        )
            .into_response()
    }
}

/// [`WorkflowError`] as answered on the public routes: the job's internal
/// status never reaches an anonymous caller.
#[derive(Debug)]
pub struct PublicError(pub WorkflowError);

impl From<WorkflowError> for PublicError {
    fn from(e: WorkflowError) -> Self {
        PublicError(e)
    }
}

impl IntoResponse for PublicError {
    fn into_response(self) -> Response {
        match self.0 {
            WorkflowError::InvalidTransition(rejected) => {
                tracing::info!(detail = %rejected, "Public request refused");
                (
                    StatusCode::CONFLICT,
                    Json(ErrorBody {
                        success: false,
                        error: NOT_READY_MESSAGE.to_string(),
                        failed_files: Vec::new(),
                    }),
                )
                    .into_response()
            }
            other => other.into_response(),
        }
    }
}
