use futures::future::join_all;
use std::time::Instant;
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::models::job::{Job, JobStatus};
use crate::models::token::TokenPurpose;
use crate::services::state_machine::JobCommand;
use crate::services::storage::document_key;
use crate::services::workflow::Workflow;

/// One file of a provider upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct IngestionReceipt {
    /// Canonical references of the files in this batch, in submission order.
    pub file_urls: Vec<String>,
    pub job: Job,
}

impl Workflow {
    /// Store a provider's documents and move the job to `pending_payment`.
    ///
    /// Files are stored concurrently. If any file fails, the job is left
    /// untouched and the names of the failed files are returned. Otherwise
    /// one atomic write consumes the upload token, appends every reference
    /// and advances the job.
    pub async fn upload_documents(
        &self,
        job_id: Uuid,
        secret: &str,
        files: Vec<UploadedFile>,
    ) -> Result<IngestionReceipt, WorkflowError> {
        let started = Instant::now();
        let authenticated = self
            .tokens
            .validate(job_id, secret, TokenPurpose::Upload, JobStatus::PendingInvoice)
            .await?;

        if files.is_empty() {
            return Err(WorkflowError::NoFiles);
        }

        let stored = join_all(files.iter().map(|file| async move {
            let key = document_key(job_id, &file.file_name);
            let result = self
                .blobs
                .put_new(&key, &file.data, &file.content_type)
                .await;
            (file, key, result)
        }))
        .await;

        let mut keys = Vec::with_capacity(stored.len());
        let mut direct_urls = Vec::with_capacity(stored.len());
        let mut failed = Vec::new();
        for (file, key, result) in stored {
            match result {
                Ok(url) => {
                    keys.push(key);
                    direct_urls.push(url);
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %job_id,
                        file_name = %file.file_name,
                        error = %e,
                        "Failed to store uploaded document"
                    );
                    failed.push(file.file_name.clone());
                }
            }
        }

        if !failed.is_empty() {
            if !keys.is_empty() {
                tracing::warn!(job_id = %job_id, orphaned = ?keys, "Batch rejected, stored objects left orphaned");
            }
            metrics::counter!("document_uploads_total", "result" => "storage_failed").increment(1);
            return Err(WorkflowError::UploadFailed { failed });
        }

        let file_urls = join_all(direct_urls.iter().map(|url| self.hook.enrich(job_id, url))).await;

        let (job, issued) = match self
            .transition(
                job_id,
                JobCommand::SubmitDocuments,
                Some(authenticated.claim()),
                file_urls.clone(),
            )
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    orphaned = ?keys,
                    error = %e,
                    "Upload not recorded, stored objects left orphaned"
                );
                metrics::counter!("document_uploads_total", "result" => "rejected").increment(1);
                // A token holder racing a concurrent upload sees a stale link.
                return Err(match e {
                    WorkflowError::InvalidTransition(_) => WorkflowError::InvalidOrExpired,
                    other => other,
                });
            }
        };

        metrics::counter!("document_uploads_total", "result" => "accepted").increment(1);
        metrics::histogram!("document_upload_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            job_id = %job_id,
            files = file_urls.len(),
            documents = job.documents.len(),
            "Documents recorded"
        );

        self.run_entry_actions(&job, issued.as_ref()).await;

        Ok(IngestionReceipt { file_urls, job })
    }
}
