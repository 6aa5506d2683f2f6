use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::models::notification::OutboundMessage;

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), MailError>;
}

/// Sends through a transactional mail HTTP API (JSON POST, bearer auth).
pub struct HttpMailer {
    http: Client,
    api_url: String,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: String, from: String) -> Result<Self, MailError> {
        let http = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            http,
            api_url,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &OutboundMessage) -> Result<(), MailError> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&SendRequest {
                from: &self.from,
                to: &message.to,
                subject: &message.subject,
                text: &message.body,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected(format!("{status}: {detail}")));
        }
        Ok(())
    }
}

/// Writes messages to the log instead of sending them. Used when no mail
/// API is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &OutboundMessage) -> Result<(), MailError> {
        tracing::info!(
            to = %message.to,
            kind = %message.kind,
            locale = %message.locale,
            subject = %message.subject,
            "Mail transport not configured, message logged only"
        );
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mail transport rejected message: {0}")]
    Rejected(String),
}
