//! Legal job status transitions.
//!
//! Status is only ever changed by one of the [`JobCommand`]s below (or by
//! the privileged override in the workflow, which bypasses entry actions).
//! `pending_validation` has no inbound command: document ingestion moves a
//! job straight from `pending_invoice` to `pending_payment`.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::models::job::JobStatus;
use crate::models::notification::NotificationKind;
use crate::models::token::TokenPurpose;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobCommand {
    Activate,
    RequestInvoice,
    /// Only issued by document ingestion.
    SubmitDocuments,
    /// Only issued by payment confirmation.
    ConfirmPayment,
}

/// A `from -> to` edge of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl JobCommand {
    pub fn edge(self) -> Edge {
        let (from, to) = match self {
            JobCommand::Activate => (JobStatus::Draft, JobStatus::Active),
            JobCommand::RequestInvoice => (JobStatus::Active, JobStatus::PendingInvoice),
            JobCommand::SubmitDocuments => (JobStatus::PendingInvoice, JobStatus::PendingPayment),
            JobCommand::ConfirmPayment => (JobStatus::PendingPayment, JobStatus::Paid),
        };
        Edge { from, to }
    }

    /// Whether internal callers may issue this command directly. The other
    /// commands require a consumed access token.
    pub fn is_internal(self) -> bool {
        matches!(self, JobCommand::Activate | JobCommand::RequestInvoice)
    }

    /// Check the command against the job's current status.
    pub fn plan(self, current: JobStatus) -> Result<Edge, TransitionRejected> {
        let edge = self.edge();
        if edge.from == current {
            Ok(edge)
        } else {
            Err(TransitionRejected {
                command: self,
                current,
                required: edge.from,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {command} a job in status {current} (requires {required})")]
pub struct TransitionRejected {
    pub command: JobCommand,
    pub current: JobStatus,
    pub required: JobStatus,
}

/// Side effects that run when a job enters a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryActions {
    /// Token to mint in the same write as the transition.
    pub mint: Option<TokenPurpose>,
    pub notify: Option<NotificationKind>,
}

pub fn entry_actions(status: JobStatus) -> EntryActions {
    match status {
        JobStatus::PendingInvoice => EntryActions {
            mint: Some(TokenPurpose::Upload),
            notify: Some(NotificationKind::InvoiceRequested),
        },
        JobStatus::PendingPayment => EntryActions {
            mint: Some(TokenPurpose::Payment),
            notify: Some(NotificationKind::PaymentRequested),
        },
        JobStatus::Paid => EntryActions {
            mint: None,
            notify: Some(NotificationKind::PaymentConfirmed),
        },
        JobStatus::Draft | JobStatus::Active | JobStatus::PendingValidation => EntryActions {
            mint: None,
            notify: None,
        },
    }
}

/// Statuses a job may be created in.
pub fn is_initial(status: JobStatus) -> bool {
    matches!(status, JobStatus::Draft | JobStatus::Active)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    const ALL: [JobStatus; 6] = [
        JobStatus::Draft,
        JobStatus::Active,
        JobStatus::PendingInvoice,
        JobStatus::PendingValidation,
        JobStatus::PendingPayment,
        JobStatus::Paid,
    ];

    #[test]
    fn each_command_is_legal_from_exactly_one_status() {
        for command in JobCommand::iter() {
            let legal: Vec<JobStatus> = ALL
                .into_iter()
                .filter(|s| command.plan(*s).is_ok())
                .collect();
            assert_eq!(legal, vec![command.edge().from], "{command}");
        }
    }

    #[test]
    fn rejection_reports_current_and_required() {
        let err = JobCommand::ConfirmPayment
            .plan(JobStatus::PendingInvoice)
            .unwrap_err();
        assert_eq!(err.current, JobStatus::PendingInvoice);
        assert_eq!(err.required, JobStatus::PendingPayment);
    }

    #[test]
    fn paid_is_terminal_and_pending_validation_has_no_command_edge() {
        for command in JobCommand::iter() {
            assert_ne!(command.edge().from, JobStatus::Paid);
            assert_ne!(command.edge().to, JobStatus::PendingValidation);
            assert_ne!(command.edge().from, JobStatus::PendingValidation);
        }
    }

    #[test]
    fn token_bearing_statuses_mint_on_entry() {
        assert_eq!(
            entry_actions(JobStatus::PendingInvoice).mint,
            Some(TokenPurpose::Upload)
        );
        assert_eq!(
            entry_actions(JobStatus::PendingPayment).mint,
            Some(TokenPurpose::Payment)
        );
        assert_eq!(entry_actions(JobStatus::Paid).mint, None);
        assert_eq!(entry_actions(JobStatus::Active), EntryActions { mint: None, notify: None });
    }

    #[test]
    fn only_draft_and_active_are_initial() {
        let initial: Vec<_> = ALL.into_iter().filter(|s| is_initial(*s)).collect();
        assert_eq!(initial, vec![JobStatus::Draft, JobStatus::Active]);
    }
}
