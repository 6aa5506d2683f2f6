use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::job::JobStatus;

/// Largest value a single line item may carry, in minor units.
pub const MAX_LINE_ITEM_CENTS: i64 = 1_000_000_000_000;

/// Reporting status of a line item. Derived from the owning job's status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LineItemStatus {
    InProgress,
    WaitingInvoice,
    WaitingPayment,
    Closed,
}

impl From<JobStatus> for LineItemStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Draft | JobStatus::Active => LineItemStatus::InProgress,
            JobStatus::PendingInvoice => LineItemStatus::WaitingInvoice,
            JobStatus::PendingValidation | JobStatus::PendingPayment => {
                LineItemStatus::WaitingPayment
            }
            JobStatus::Paid => LineItemStatus::Closed,
        }
    }
}

/// A dated, valued breakdown entry of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub job_id: Uuid,
    pub client_id: Uuid,
    pub campaign_id: Uuid,
    pub job_type_id: Uuid,
    pub manager_id: Uuid,
    pub provider_id: Uuid,
    pub period_year: i32,
    pub period_month: i32,
    pub value_cents: i64,
    pub status: LineItemStatus,
    pub created_at: DateTime<Utc>,
}

/// Request body for adding a line item to a job.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewLineItem {
    #[garde(skip)]
    pub client_id: Uuid,
    #[garde(skip)]
    pub campaign_id: Uuid,
    #[garde(skip)]
    pub job_type_id: Uuid,
    #[garde(skip)]
    pub manager_id: Uuid,
    #[garde(skip)]
    pub provider_id: Uuid,
    #[garde(range(min = 2000, max = 2999))]
    pub period_year: i32,
    #[garde(range(min = 1, max = 12))]
    pub period_month: i32,
    #[garde(range(min = 0, max = MAX_LINE_ITEM_CENTS))]
    pub value_cents: i64,
}
