use async_trait::async_trait;
use uuid::Uuid;

use crate::models::job::{Job, JobStatus, NewJob};
use crate::models::line_item::{LineItem, NewLineItem};
use crate::models::notification::JobContacts;
use crate::models::token::{AccessToken, NewAccessToken, TokenPurpose};

/// Token that a transition must consume to be applied.
#[derive(Debug, Clone)]
pub struct TokenClaim {
    pub purpose: TokenPurpose,
    pub secret_hash: Vec<u8>,
}

/// One atomic status change, with everything that must happen alongside it.
///
/// Applied in a single transaction: consume `consume` (if any), move the job
/// `from -> to` only if its status is still `from`, append `append_documents`,
/// revoke the job's other live tokens, insert `issue` (if any) and realign
/// line-item statuses. Nothing is written unless every step succeeds.
#[derive(Debug, Clone)]
pub struct TransitionCommit {
    pub job_id: Uuid,
    pub from: JobStatus,
    pub to: JobStatus,
    pub consume: Option<TokenClaim>,
    pub append_documents: Vec<String>,
    pub issue: Option<NewAccessToken>,
}

#[derive(Debug)]
pub enum CommitOutcome {
    Applied(Job),
    /// The job was missing or no longer in `from`.
    StatusMismatch { current: Option<JobStatus> },
    /// The claimed token was not live (already consumed, revoked, expired or unknown).
    TokenRejected,
}

#[derive(Debug)]
pub enum IssueOutcome {
    Issued(AccessToken),
    /// The job was missing or not in the expected status; nothing was written.
    StatusMismatch { current: Option<JobStatus> },
}

/// Privileged status write that skips entry actions.
#[derive(Debug, Clone)]
pub struct StatusOverride {
    pub job_id: Uuid,
    pub to: JobStatus,
    pub actor: String,
    pub reason: String,
}

/// Durable, transactional storage for jobs, line items and access tokens.
///
/// There is no generic "update status" method: status only
/// changes through [`JobStore::commit_transition`] or
/// [`JobStore::override_status`].
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Insert a line item and add its value to the job, atomically.
    async fn add_line_item(&self, job_id: Uuid, item: NewLineItem)
        -> Result<LineItem, StoreError>;

    async fn line_items(&self, job_id: Uuid) -> Result<Vec<LineItem>, StoreError>;

    async fn job_contacts(&self, job_id: Uuid) -> Result<JobContacts, StoreError>;

    /// Store a new token and revoke every other live token of the job.
    ///
    /// Serialized per job. With `expected` set, nothing is written unless
    /// the job is still in that status.
    async fn issue_token(
        &self,
        token: NewAccessToken,
        expected: Option<JobStatus>,
    ) -> Result<IssueOutcome, StoreError>;

    /// Unconsumed, unrevoked token of the job with this digest, expired or not.
    async fn find_token(
        &self,
        job_id: Uuid,
        secret_hash: &[u8],
    ) -> Result<Option<AccessToken>, StoreError>;

    /// Revoke all live tokens of the job. Returns how many were revoked.
    async fn revoke_tokens(&self, job_id: Uuid) -> Result<u64, StoreError>;

    async fn commit_transition(&self, commit: TransitionCommit)
        -> Result<CommitOutcome, StoreError>;

    /// Returns the job's previous status and the updated job, or `None` if
    /// the job does not exist.
    async fn override_status(
        &self,
        change: StatusOverride,
    ) -> Result<Option<(JobStatus, Job)>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Value overflow: {0}")]
    Overflow(String),

    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
