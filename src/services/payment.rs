use uuid::Uuid;

use crate::error::WorkflowError;
use crate::models::job::{Job, JobStatus};
use crate::models::token::TokenPurpose;
use crate::services::state_machine::{JobCommand, TransitionRejected};
use crate::services::workflow::Workflow;

impl Workflow {
    /// Confirm payment of a job with the payer's token and move it to `paid`.
    ///
    /// Any live token of the job identifies the caller as a party to it, so a
    /// job that is not yet awaiting payment reports `InvalidTransition`. Only a
    /// payment token can complete the transition; a consumed, revoked or
    /// expired token is `InvalidOrExpired`.
    pub async fn confirm_payment(&self, job_id: Uuid, secret: &str) -> Result<Job, WorkflowError> {
        let authenticated = self.tokens.authenticate_holder(job_id, secret).await?;

        let command = JobCommand::ConfirmPayment;
        let current = authenticated.job.status;
        if current != JobStatus::PendingPayment {
            tracing::info!(job_id = %job_id, current = %current, "Payment confirmation on job not awaiting payment");
            return Err(TransitionRejected {
                command,
                current,
                required: command.edge().from,
            }
            .into());
        }
        if authenticated.token.purpose != TokenPurpose::Payment {
            tracing::debug!(job_id = %job_id, purpose = %authenticated.token.purpose, "Payment confirmation with non-payment token");
            return Err(WorkflowError::InvalidOrExpired);
        }

        let (job, issued) = self
            .transition(job_id, command, Some(authenticated.claim()), Vec::new())
            .await?;

        metrics::counter!("payments_confirmed_total").increment(1);
        tracing::info!(job_id = %job_id, value_cents = job.value_cents, currency = %job.currency, "Payment confirmed");

        self.run_entry_actions(&job, issued.as_ref()).await;
        Ok(job)
    }
}
