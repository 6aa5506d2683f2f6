//! Wiring shared by the server and worker binaries.

use chrono::Duration as TokenTtl;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::db::JobStore;
use crate::services::{
    hook::{DocumentHook, HookError},
    mailer::{HttpMailer, LogMailer, MailError, Mailer},
    notifications::NotificationDispatcher,
    queue::NotificationQueue,
    storage::{R2Client, StorageError},
    templates::{TemplateError, TemplateRegistry},
    tokens::TokenService,
    workflow::Workflow,
};

/// Initialize structured JSON logging, `info` unless `RUST_LOG` says otherwise.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();
}

/// HTTP mailer when a mail API is configured, log-only otherwise.
pub fn build_mailer(config: &AppConfig) -> Result<Arc<dyn Mailer>, StartupError> {
    match (&config.mail_api_url, &config.mail_api_key) {
        (Some(url), Some(key)) => {
            tracing::info!("Using HTTP mail transport");
            Ok(Arc::new(HttpMailer::new(
                url.clone(),
                key.clone(),
                config.mail_from.clone(),
            )?))
        }
        (Some(_), None) => Err(StartupError::Config(
            "MAIL_API_URL is set but MAIL_API_KEY is missing".to_string(),
        )),
        _ => {
            tracing::warn!("MAIL_API_URL not set, notifications will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

pub fn build_queue(config: &AppConfig) -> Result<Option<Arc<NotificationQueue>>, StartupError> {
    config
        .redis_url
        .as_deref()
        .map(|url| NotificationQueue::new(url).map(Arc::new))
        .transpose()
        .map_err(|e| StartupError::Config(e.to_string()))
}

/// Assemble the workflow engine. Fails if the template registry is incomplete.
pub fn build_workflow(
    config: &AppConfig,
    store: Arc<dyn JobStore>,
    queue: Option<Arc<NotificationQueue>>,
) -> Result<Workflow, StartupError> {
    let templates = TemplateRegistry::builtin(config.default_locale)?;

    let blobs = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
        &config.r2_public_url,
    )?;

    let hook = DocumentHook::new(
        config.document_hook_url.clone(),
        Duration::from_millis(config.document_hook_timeout_ms),
        config.document_hook_failure_threshold,
        Duration::from_secs(config.document_hook_cooldown_secs),
    )?;

    let notifier = NotificationDispatcher::new(
        store.clone(),
        templates,
        build_mailer(config)?,
        queue,
        config.default_locale,
    );

    let tokens = TokenService::new(store.clone(), TokenTtl::hours(config.token_ttl_hours));

    Ok(Workflow::new(
        store,
        tokens,
        Arc::new(blobs),
        hook,
        notifier,
        &config.public_base_url,
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template registry incomplete: {0}")]
    Templates(#[from] TemplateError),

    #[error("Blob storage: {0}")]
    Storage(#[from] StorageError),

    #[error("Document hook: {0}")]
    Hook(#[from] HookError),

    #[error("Mail transport: {0}")]
    Mail(#[from] MailError),
}
