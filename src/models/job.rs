use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a job in the invoicing workflow, in forward order.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Draft,
    Active,
    PendingInvoice,
    PendingValidation,
    PendingPayment,
    Paid,
}

/// A billable unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub provider_id: Uuid,
    pub manager_id: Uuid,
    pub status: JobStatus,
    pub value_cents: i64,
    pub currency: String,
    pub documents: Vec<String>,
    pub due_date: Option<NaiveDate>,
    pub public_notes: Option<String>,
    pub private_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// True when the job carries a due date strictly before `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_date.is_some_and(|due| due < today)
    }
}

/// Fields an internal actor supplies when creating a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub campaign_id: Uuid,
    pub provider_id: Uuid,
    pub manager_id: Uuid,
    pub status: JobStatus,
    pub currency: String,
    pub due_date: Option<NaiveDate>,
    pub public_notes: Option<String>,
    pub private_notes: Option<String>,
}

/// What an unauthenticated caller is allowed to see about a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub status: JobStatus,
    pub value_cents: i64,
    pub currency: String,
    pub due_date: Option<NaiveDate>,
    pub documents: Vec<String>,
    pub public_notes: Option<String>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            value_cents: job.value_cents,
            currency: job.currency.clone(),
            due_date: job.due_date,
            documents: job.documents.clone(),
            public_notes: job.public_notes.clone(),
        }
    }
}
