//! Test harness: the workflow wired to in-memory collaborators

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use invoice_workflow::app_state::AppState;
use invoice_workflow::db::{JobStore, MemoryJobStore};
use invoice_workflow::models::job::{Job, JobStatus, NewJob};
use invoice_workflow::models::notification::{JobContacts, Locale, OutboundMessage};
use invoice_workflow::routes;
use invoice_workflow::services::hook::DocumentHook;
use invoice_workflow::services::ingestion::UploadedFile;
use invoice_workflow::services::mailer::{MailError, Mailer};
use invoice_workflow::services::notifications::NotificationDispatcher;
use invoice_workflow::services::state_machine::JobCommand;
use invoice_workflow::services::storage::{BlobStore, MemoryBlobStore};
use invoice_workflow::services::templates::TemplateRegistry;
use invoice_workflow::services::tokens::TokenService;
use invoice_workflow::services::workflow::Workflow;

use crate::fixtures;

pub const PUBLIC_BASE_URL: &str = "https://jobs.example";
pub const INTERNAL_KEY: &str = "test-internal-key";

/// Mailer that records every message and can be switched to fail.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundMessage>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, email: &str) -> Vec<OutboundMessage> {
        self.sent().into_iter().filter(|m| m.to == email).collect()
    }

    /// Token secret from the link in the latest message sent to `email`.
    pub fn last_token_for(&self, email: &str) -> String {
        let message = self
            .sent_to(email)
            .pop()
            .unwrap_or_else(|| panic!("no message sent to {email}"));
        token_from_body(&message.body)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &OutboundMessage) -> Result<(), MailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Rejected("503: transport unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub fn token_from_body(body: &str) -> String {
    let start = body.find("token=").expect("message carries no link") + "token=".len();
    body[start..]
        .split(|c: char| c.is_whitespace())
        .next()
        .unwrap()
        .to_string()
}

pub fn build_workflow(
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    mailer: Arc<dyn Mailer>,
) -> Workflow {
    build_workflow_with_hook(store, blobs, mailer, DocumentHook::disabled())
}

pub fn build_workflow_with_hook(
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    mailer: Arc<dyn Mailer>,
    hook: DocumentHook,
) -> Workflow {
    let templates = TemplateRegistry::builtin(Locale::En).expect("builtin templates are complete");
    let notifier = NotificationDispatcher::new(store.clone(), templates, mailer, None, Locale::En);
    let tokens = TokenService::new(store.clone(), Duration::hours(24));
    Workflow::new(
        store,
        tokens,
        blobs,
        hook,
        notifier,
        PUBLIC_BASE_URL,
    )
}

pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub mailer: Arc<RecordingMailer>,
    pub workflow: Arc<Workflow>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_hook(DocumentHook::disabled())
    }

    pub fn with_hook(hook: DocumentHook) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let workflow =
            build_workflow_with_hook(store.clone(), blobs.clone(), mailer.clone(), hook);
        Self {
            store,
            blobs,
            mailer,
            workflow: Arc::new(workflow),
        }
    }

    /// Active job with every contact configured.
    pub async fn active_job(&self) -> Job {
        self.job_with(fixtures::new_job(JobStatus::Active, None), fixtures::contacts())
            .await
    }

    pub async fn job_with(&self, new_job: NewJob, contacts: JobContacts) -> Job {
        let job = self.workflow.create_job(new_job).await.unwrap();
        self.store.set_contacts(job.id, contacts);
        job
    }

    /// Move an active job to `pending_invoice` and return the upload token
    /// the provider was emailed.
    pub async fn request_invoice(&self, job: &Job) -> String {
        self.workflow
            .apply(job.id, JobCommand::RequestInvoice)
            .await
            .unwrap();
        self.mailer.last_token_for(fixtures::PROVIDER_EMAIL)
    }

    pub async fn job(&self, job: &Job) -> Job {
        self.workflow.get_job(job.id).await.unwrap()
    }
}

pub fn pdf(name: &str, data: &[u8]) -> UploadedFile {
    UploadedFile {
        file_name: name.to_string(),
        content_type: "application/pdf".to_string(),
        data: data.to_vec(),
    }
}

/// Serve the router on an ephemeral port. Returns the base URL.
pub async fn spawn_app(harness: &Harness) -> String {
    let workflow = build_workflow(
        harness.store.clone(),
        harness.blobs.clone(),
        harness.mailer.clone(),
    );
    let state = AppState::new(workflow, harness.store.clone(), None, INTERNAL_KEY);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, routes::router(state)).await.unwrap();
    });

    format!("http://{addr}")
}

/// Serve a document hook that answers every call with `reference`. Returns
/// the hook URL.
pub async fn spawn_hook(reference: &'static str) -> String {
    let app = axum::Router::new().route(
        "/hook",
        axum::routing::post(move || async move { axum::Json(serde_json::json!({ "url": reference })) }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind hook listener");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}/hook")
}

pub fn hook_at(url: &str) -> DocumentHook {
    DocumentHook::new(
        Some(url.to_string()),
        std::time::Duration::from_secs(2),
        3,
        std::time::Duration::from_secs(60),
    )
    .expect("Failed to build document hook")
}
