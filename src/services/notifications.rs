use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{JobStore, StoreError};
use crate::models::job::Job;
use crate::models::notification::{
    Contact, Locale, NotificationKind, OutboundMessage, RecipientRole,
};
use crate::services::mailer::{MailError, Mailer};
use crate::services::queue::{NotificationQueue, QueuedNotification};
use crate::services::templates::{carries_link, TemplateError, TemplateRegistry, TemplateVars};

/// Result of a best-effort notification, as reported to internal callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The status has no notification attached.
    Skipped,
    Delivered,
    Failed,
}

/// Who hears about each kind of event.
pub fn recipients(kind: NotificationKind) -> &'static [RecipientRole] {
    match kind {
        NotificationKind::InvoiceRequested => &[RecipientRole::Provider],
        NotificationKind::PaymentRequested => &[RecipientRole::Finance],
        NotificationKind::PaymentConfirmed => &[RecipientRole::Provider, RecipientRole::Manager],
    }
}

/// Short human reference for a job in emails.
pub fn job_ref(job_id: Uuid) -> String {
    job_id.simple().to_string()[..8].to_ascii_uppercase()
}

pub fn format_amount(value_cents: i64, currency: &str) -> String {
    let sign = if value_cents < 0 { "-" } else { "" };
    let cents = value_cents.unsigned_abs();
    format!("{sign}{}.{:02} {currency}", cents / 100, cents % 100)
}

/// Resolves recipients and locale, renders templates and hands messages to
/// the mail transport. Never changes job state.
pub struct NotificationDispatcher {
    store: Arc<dyn JobStore>,
    templates: TemplateRegistry,
    mailer: Arc<dyn Mailer>,
    retry_queue: Option<Arc<NotificationQueue>>,
    default_locale: Locale,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        templates: TemplateRegistry,
        mailer: Arc<dyn Mailer>,
        retry_queue: Option<Arc<NotificationQueue>>,
        default_locale: Locale,
    ) -> Self {
        Self {
            store,
            templates,
            mailer,
            retry_queue,
            default_locale,
        }
    }

    /// Send `kind` for `job` to every recipient of that kind.
    ///
    /// Recipients are attempted independently; the first problem is
    /// returned after all of them have been tried. Returns how many messages
    /// were delivered.
    pub async fn notify(
        &self,
        job: &Job,
        kind: NotificationKind,
        link: Option<&str>,
    ) -> Result<usize, NotificationError> {
        if carries_link(kind) && link.is_none() {
            return Err(NotificationError::MissingLink(kind));
        }

        let contacts = self.store.job_contacts(job.id).await?;
        let mut delivered = 0;
        let mut first_error = None;

        for role in recipients(kind) {
            let result = match contacts.for_role(*role) {
                Some(contact) => self.deliver(job, kind, contact, link).await,
                None => Err(NotificationError::MissingRecipient {
                    job_id: job.id,
                    role: *role,
                }),
            };

            match result {
                Ok(()) => {
                    delivered += 1;
                    metrics::counter!("notifications_sent_total", "kind" => kind.to_string())
                        .increment(1);
                }
                Err(e) => {
                    let reason = if e.is_configuration() { "configuration" } else { "transport" };
                    metrics::counter!(
                        "notifications_failed_total",
                        "kind" => kind.to_string(),
                        "reason" => reason
                    )
                    .increment(1);
                    if e.is_configuration() {
                        tracing::error!(job_id = %job.id, kind = %kind, role = %role, error = %e, "Notification configuration error");
                    } else {
                        tracing::warn!(job_id = %job.id, kind = %kind, role = %role, error = %e, "Notification delivery failed");
                    }
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(delivered),
        }
    }

    /// Render a message without sending it.
    pub fn render(
        &self,
        job: &Job,
        kind: NotificationKind,
        contact: &Contact,
        link: Option<&str>,
    ) -> Result<OutboundMessage, NotificationError> {
        let locale = Locale::resolve(contact.preferred_language.as_deref(), self.default_locale);
        let vars = TemplateVars {
            recipient_name: contact.name.clone(),
            job_ref: job_ref(job.id),
            amount: format_amount(job.value_cents, &job.currency),
            due_date: job
                .due_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            link: link.unwrap_or_default().to_string(),
        };
        let (subject, body) = self.templates.render(kind, locale, &vars)?;

        Ok(OutboundMessage {
            to: contact.email.clone(),
            locale,
            kind,
            subject,
            body,
        })
    }

    async fn deliver(
        &self,
        job: &Job,
        kind: NotificationKind,
        contact: &Contact,
        link: Option<&str>,
    ) -> Result<(), NotificationError> {
        let message = self.render(job, kind, contact, link)?;

        match self.mailer.send(&message).await {
            Ok(()) => {
                tracing::info!(job_id = %job.id, kind = %kind, locale = %message.locale, "Notification sent");
                Ok(())
            }
            Err(source) => {
                self.queue_retry(job.id, message).await;
                Err(NotificationError::Transport { job_id: job.id, source })
            }
        }
    }

    async fn queue_retry(&self, job_id: Uuid, message: OutboundMessage) {
        let Some(queue) = &self.retry_queue else {
            return;
        };
        let item = QueuedNotification {
            job_id,
            message,
            attempts: 1,
        };
        if let Err(e) = queue.enqueue(&item).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to queue notification for retry");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("job {job_id} has no {role} contact configured")]
    MissingRecipient { job_id: Uuid, role: RecipientRole },

    #[error("notification {0} requires a link")]
    MissingLink(NotificationKind),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("could not load recipients: {0}")]
    Store(#[from] StoreError),

    #[error("delivery for job {job_id} failed: {source}")]
    Transport {
        job_id: Uuid,
        #[source]
        source: MailError,
    },
}

impl NotificationError {
    /// Configuration problems will not go away by retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            NotificationError::MissingRecipient { .. }
                | NotificationError::MissingLink(_)
                | NotificationError::Template(_)
        )
    }
}
