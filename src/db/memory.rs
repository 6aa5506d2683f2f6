//! In-process [`JobStore`] with the same atomicity as the Postgres store.
//!
//! Every operation runs under one mutex, so a `commit_transition` is a single
//! critical section. Used by the test suites and for running the service
//! without a database.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::store::{
    CommitOutcome, IssueOutcome, JobStore, StatusOverride, StoreError, TransitionCommit,
};
use crate::models::job::{Job, JobStatus, NewJob};
use crate::models::line_item::{LineItem, LineItemStatus, NewLineItem};
use crate::models::notification::JobContacts;
use crate::models::token::{AccessToken, NewAccessToken};

/// One row of the override audit trail.
#[derive(Debug, Clone)]
pub struct OverrideRecord {
    pub job_id: Uuid,
    pub from: JobStatus,
    pub to: JobStatus,
    pub actor: String,
    pub reason: String,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    tokens: Vec<AccessToken>,
    line_items: Vec<LineItem>,
    contacts: HashMap<Uuid, JobContacts>,
    overrides: Vec<OverrideRecord>,
}

impl Inner {
    fn revoke_live(&mut self, job_id: Uuid) -> u64 {
        let now = Utc::now();
        let mut revoked = 0;
        for token in self
            .tokens
            .iter_mut()
            .filter(|t| t.job_id == job_id && t.consumed_at.is_none() && t.revoked_at.is_none())
        {
            token.revoked_at = Some(now);
            revoked += 1;
        }
        revoked
    }

    fn insert_token(&mut self, token: &NewAccessToken) -> AccessToken {
        let stored = AccessToken {
            id: Uuid::new_v4(),
            job_id: token.job_id,
            purpose: token.purpose,
            secret_hash: token.secret_hash.clone(),
            issued_at: Utc::now(),
            expires_at: token.expires_at,
            consumed_at: None,
            revoked_at: None,
        };
        self.tokens.push(stored.clone());
        stored
    }

    fn sync_line_items(&mut self, job_id: Uuid, status: JobStatus) {
        for item in self.line_items.iter_mut().filter(|i| i.job_id == job_id) {
            item.status = LineItemStatus::from(status);
        }
    }
}

#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_contacts(&self, job_id: Uuid, contacts: JobContacts) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contacts
            .insert(job_id, contacts);
    }

    /// All token rows of a job, including consumed and revoked ones.
    pub fn tokens_for(&self, job_id: Uuid) -> Vec<AccessToken> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tokens
            .iter()
            .filter(|t| t.job_id == job_id)
            .cloned()
            .collect()
    }

    pub fn overrides(&self) -> Vec<OverrideRecord> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .overrides
            .clone()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError> {
        let now = Utc::now();
        let created = Job {
            id: Uuid::new_v4(),
            campaign_id: job.campaign_id,
            provider_id: job.provider_id,
            manager_id: job.manager_id,
            status: job.status,
            value_cents: 0,
            currency: job.currency,
            documents: Vec::new(),
            due_date: job.due_date,
            public_notes: job.public_notes,
            private_notes: job.private_notes,
            created_at: now,
            updated_at: now,
        };
        self.lock()?.jobs.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.lock()?.jobs.get(&job_id).cloned())
    }

    async fn add_line_item(
        &self,
        job_id: Uuid,
        item: NewLineItem,
    ) -> Result<LineItem, StoreError> {
        let mut inner = self.lock()?;
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::JobNotFound(job_id))?;
        job.value_cents = job
            .value_cents
            .checked_add(item.value_cents)
            .ok_or_else(|| {
                StoreError::Overflow(format!("job {job_id} value exceeds the supported range"))
            })?;
        job.updated_at = Utc::now();
        let status = LineItemStatus::from(job.status);

        let line_item = LineItem {
            id: Uuid::new_v4(),
            job_id,
            client_id: item.client_id,
            campaign_id: item.campaign_id,
            job_type_id: item.job_type_id,
            manager_id: item.manager_id,
            provider_id: item.provider_id,
            period_year: item.period_year,
            period_month: item.period_month,
            value_cents: item.value_cents,
            status,
            created_at: Utc::now(),
        };
        inner.line_items.push(line_item.clone());
        Ok(line_item)
    }

    async fn line_items(&self, job_id: Uuid) -> Result<Vec<LineItem>, StoreError> {
        Ok(self
            .lock()?
            .line_items
            .iter()
            .filter(|i| i.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn job_contacts(&self, job_id: Uuid) -> Result<JobContacts, StoreError> {
        let inner = self.lock()?;
        if !inner.jobs.contains_key(&job_id) {
            return Err(StoreError::JobNotFound(job_id));
        }
        Ok(inner.contacts.get(&job_id).cloned().unwrap_or_default())
    }

    async fn issue_token(
        &self,
        token: NewAccessToken,
        expected: Option<JobStatus>,
    ) -> Result<IssueOutcome, StoreError> {
        let mut inner = self.lock()?;
        let current = inner.jobs.get(&token.job_id).map(|j| j.status);
        if current.is_none() || (expected.is_some() && current != expected) {
            return Ok(IssueOutcome::StatusMismatch { current });
        }
        inner.revoke_live(token.job_id);
        Ok(IssueOutcome::Issued(inner.insert_token(&token)))
    }

    async fn find_token(
        &self,
        job_id: Uuid,
        secret_hash: &[u8],
    ) -> Result<Option<AccessToken>, StoreError> {
        Ok(self
            .lock()?
            .tokens
            .iter()
            .find(|t| {
                t.job_id == job_id
                    && t.secret_hash == secret_hash
                    && t.consumed_at.is_none()
                    && t.revoked_at.is_none()
            })
            .cloned())
    }

    async fn revoke_tokens(&self, job_id: Uuid) -> Result<u64, StoreError> {
        Ok(self.lock()?.revoke_live(job_id))
    }

    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<CommitOutcome, StoreError> {
        let mut inner = self.lock()?;
        let now = Utc::now();

        let claimed = match &commit.consume {
            Some(claim) => {
                let position = inner.tokens.iter().position(|t| {
                    t.job_id == commit.job_id
                        && t.purpose == claim.purpose
                        && t.secret_hash == claim.secret_hash
                        && t.is_live(now)
                });
                match position {
                    Some(position) => Some(position),
                    None => return Ok(CommitOutcome::TokenRejected),
                }
            }
            None => None,
        };

        let current = inner.jobs.get(&commit.job_id).map(|j| j.status);
        if current != Some(commit.from) {
            return Ok(CommitOutcome::StatusMismatch { current });
        }

        if let Some(position) = claimed {
            inner.tokens[position].consumed_at = Some(now);
        }
        let job = match inner.jobs.get_mut(&commit.job_id) {
            Some(job) => job,
            None => return Ok(CommitOutcome::StatusMismatch { current: None }),
        };
        job.status = commit.to;
        job.documents.extend(commit.append_documents.iter().cloned());
        job.updated_at = now;
        let job = job.clone();

        inner.revoke_live(commit.job_id);
        if let Some(token) = &commit.issue {
            inner.insert_token(token);
        }
        inner.sync_line_items(commit.job_id, commit.to);

        Ok(CommitOutcome::Applied(job))
    }

    async fn override_status(
        &self,
        change: StatusOverride,
    ) -> Result<Option<(JobStatus, Job)>, StoreError> {
        let mut inner = self.lock()?;
        let Some(job) = inner.jobs.get_mut(&change.job_id) else {
            return Ok(None);
        };
        let previous = job.status;
        job.status = change.to;
        job.updated_at = Utc::now();
        let job = job.clone();

        inner.revoke_live(change.job_id);
        inner.sync_line_items(change.job_id, change.to);
        inner.overrides.push(OverrideRecord {
            job_id: change.job_id,
            from: previous,
            to: change.to,
            actor: change.actor,
            reason: change.reason,
        });

        Ok(Some((previous, job)))
    }
}
