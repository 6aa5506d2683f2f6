use std::sync::Arc;
use uuid::Uuid;

use crate::db::{CommitOutcome, JobStore, StatusOverride, TokenClaim, TransitionCommit};
use crate::error::WorkflowError;
use crate::models::job::{Job, JobStatus, JobSummary, NewJob};
use crate::models::line_item::{LineItem, NewLineItem};
use crate::models::token::{IssuedToken, TokenPurpose};
use crate::services::hook::DocumentHook;
use crate::services::notifications::{DispatchOutcome, NotificationDispatcher};
use crate::services::state_machine::{self, JobCommand, TransitionRejected};
use crate::services::storage::BlobStore;
use crate::services::tokens::TokenService;

/// The invoicing workflow engine. Sole writer of job status.
pub struct Workflow {
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) tokens: TokenService,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) hook: DocumentHook,
    pub(crate) notifier: NotificationDispatcher,
    public_base_url: String,
}

impl Workflow {
    pub fn new(
        store: Arc<dyn JobStore>,
        tokens: TokenService,
        blobs: Arc<dyn BlobStore>,
        hook: DocumentHook,
        notifier: NotificationDispatcher,
        public_base_url: &str,
    ) -> Self {
        Self {
            store,
            tokens,
            blobs,
            hook,
            notifier,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Link embedded in emails for a token.
    pub fn link_for(&self, token: &IssuedToken) -> String {
        let page = match token.purpose {
            TokenPurpose::Upload => "upload",
            TokenPurpose::Payment => "payment",
        };
        format!(
            "{}/{}/{}?token={}",
            self.public_base_url, page, token.job_id, token.secret
        )
    }

    pub async fn create_job(&self, job: NewJob) -> Result<Job, WorkflowError> {
        if !state_machine::is_initial(job.status) {
            return Err(WorkflowError::Validation(format!(
                "jobs are created in draft or active, not {}",
                job.status
            )));
        }
        let job = self.store.create_job(job).await?;
        tracing::info!(job_id = %job.id, status = %job.status, "Job created");
        Ok(job)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Job, WorkflowError> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or(WorkflowError::JobNotFound(job_id))
    }

    pub async fn add_line_item(
        &self,
        job_id: Uuid,
        item: NewLineItem,
    ) -> Result<LineItem, WorkflowError> {
        let item = self.store.add_line_item(job_id, item).await?;
        tracing::info!(job_id = %job_id, line_item_id = %item.id, value_cents = item.value_cents, "Line item added");
        Ok(item)
    }

    /// Mint a token for the job, superseding any earlier one.
    pub async fn issue_token(
        &self,
        job_id: Uuid,
        purpose: TokenPurpose,
    ) -> Result<IssuedToken, WorkflowError> {
        Ok(self.tokens.issue(job_id, purpose, None).await?)
    }

    pub async fn invalidate_tokens(&self, job_id: Uuid) -> Result<u64, WorkflowError> {
        Ok(self.tokens.invalidate(job_id).await?)
    }

    /// Pre-render check for the public pages: is this link usable right now?
    pub async fn validate_access(
        &self,
        job_id: Uuid,
        secret: &str,
        purpose: TokenPurpose,
    ) -> Result<JobSummary, WorkflowError> {
        let authenticated = self
            .tokens
            .validate(job_id, secret, purpose, purpose.scoped_status())
            .await?;
        Ok(JobSummary::from(&authenticated.job))
    }

    /// Apply an internal command (`activate`, `request_invoice`).
    pub async fn apply(&self, job_id: Uuid, command: JobCommand) -> Result<Job, WorkflowError> {
        if !command.is_internal() {
            return Err(WorkflowError::Validation(format!(
                "{command} can only be triggered through its access link"
            )));
        }

        let job = self.get_job(job_id).await?;
        command.plan(job.status)?;

        let (job, issued) = self.transition(job_id, command, None, Vec::new()).await?;
        self.run_entry_actions(&job, issued.as_ref()).await;
        Ok(job)
    }

    /// Set any status directly. Skips entry actions, revokes live tokens and
    /// leaves an audit row.
    pub async fn override_status(
        &self,
        job_id: Uuid,
        to: JobStatus,
        actor: &str,
        reason: &str,
    ) -> Result<Job, WorkflowError> {
        let (from, job) = self
            .store
            .override_status(StatusOverride {
                job_id,
                to,
                actor: actor.to_string(),
                reason: reason.to_string(),
            })
            .await?
            .ok_or(WorkflowError::JobNotFound(job_id))?;

        tracing::warn!(
            job_id = %job_id,
            from = %from,
            to = %to,
            actor = %actor,
            reason = %reason,
            "Job status overridden, entry actions skipped"
        );
        metrics::counter!("workflow_status_overrides_total").increment(1);
        Ok(job)
    }

    /// Re-announce the status a job is currently in. Token-bearing statuses
    /// get a fresh token, which supersedes the link sent earlier. The token
    /// is only written if the job is still in `status` at that moment.
    pub async fn notify_status_change(
        &self,
        job_id: Uuid,
        status: JobStatus,
    ) -> Result<DispatchOutcome, WorkflowError> {
        let job = self.get_job(job_id).await?;
        if job.status != status {
            return Err(WorkflowError::Validation(format!(
                "job is in {}, not {}",
                job.status, status
            )));
        }

        let issued = match state_machine::entry_actions(status).mint {
            Some(purpose) => Some(self.tokens.issue(job_id, purpose, Some(status)).await?),
            None => None,
        };
        Ok(self.run_entry_actions(&job, issued.as_ref()).await)
    }

    /// Commit `command` as one conditional write, minting the entry token of
    /// the target status in the same write.
    pub(crate) async fn transition(
        &self,
        job_id: Uuid,
        command: JobCommand,
        consume: Option<TokenClaim>,
        append_documents: Vec<String>,
    ) -> Result<(Job, Option<IssuedToken>), WorkflowError> {
        let edge = command.edge();
        let (issued, row) = match state_machine::entry_actions(edge.to).mint {
            Some(purpose) => {
                let (issued, row) = self.tokens.prepare(job_id, purpose);
                (Some(issued), Some(row))
            }
            None => (None, None),
        };

        let outcome = self
            .store
            .commit_transition(TransitionCommit {
                job_id,
                from: edge.from,
                to: edge.to,
                consume,
                append_documents,
                issue: row,
            })
            .await?;

        match outcome {
            CommitOutcome::Applied(job) => {
                tracing::info!(
                    job_id = %job_id,
                    command = %command,
                    from = %edge.from,
                    to = %edge.to,
                    "Job transitioned"
                );
                metrics::counter!("workflow_transitions_total", "to" => edge.to.to_string())
                    .increment(1);
                Ok((job, issued))
            }
            CommitOutcome::StatusMismatch { current: Some(current) } => {
                tracing::info!(job_id = %job_id, command = %command, current = %current, "Transition rejected");
                Err(TransitionRejected {
                    command,
                    current,
                    required: edge.from,
                }
                .into())
            }
            CommitOutcome::StatusMismatch { current: None } => Err(WorkflowError::JobNotFound(job_id)),
            CommitOutcome::TokenRejected => {
                tracing::info!(job_id = %job_id, command = %command, "Transition rejected: token no longer live");
                Err(WorkflowError::InvalidOrExpired)
            }
        }
    }

    /// Send the notification attached to the job's current status. Failures
    /// are logged and counted, never returned.
    pub(crate) async fn run_entry_actions(
        &self,
        job: &Job,
        issued: Option<&IssuedToken>,
    ) -> DispatchOutcome {
        let Some(kind) = state_machine::entry_actions(job.status).notify else {
            return DispatchOutcome::Skipped;
        };

        let link = issued.map(|t| self.link_for(t));
        match self.notifier.notify(job, kind, link.as_deref()).await {
            Ok(_) => DispatchOutcome::Delivered,
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    kind = %kind,
                    error = %e,
                    "Notification failed, transition stays committed"
                );
                DispatchOutcome::Failed
            }
        }
    }
}
