use chrono::NaiveDate;
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{JobStatus, JobSummary};
use super::token::TokenPurpose;
use crate::services::notifications::DispatchOutcome;
use crate::services::state_machine::JobCommand;

/// Query for `GET /api/v1/public/jobs/{job_id}/access`.
#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    pub token: String,
    pub purpose: TokenPurpose,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub failed_files: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmPaymentRequest {
    #[garde(length(min = 1, max = 256))]
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmPaymentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request body for `POST /internal/jobs`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[garde(skip)]
    pub campaign_id: Uuid,
    #[garde(skip)]
    pub provider_id: Uuid,
    #[garde(skip)]
    pub manager_id: Uuid,
    #[garde(skip)]
    #[serde(default = "default_initial_status")]
    pub status: JobStatus,
    #[garde(length(min = 3, max = 3))]
    pub currency: String,
    #[garde(skip)]
    pub due_date: Option<NaiveDate>,
    #[garde(length(max = 4000))]
    pub public_notes: Option<String>,
    #[garde(length(max = 4000))]
    pub private_notes: Option<String>,
}

fn default_initial_status() -> JobStatus {
    JobStatus::Draft
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub command: JobCommand,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OverrideRequest {
    #[garde(skip)]
    pub status: JobStatus,
    #[garde(length(min = 1, max = 200))]
    pub actor: String,
    #[garde(length(min = 1, max = 1000))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub status: JobStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub outcome: DispatchOutcome,
}
