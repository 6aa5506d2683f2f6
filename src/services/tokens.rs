use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{IssueOutcome, JobStore, StoreError, TokenClaim};
use crate::models::job::{Job, JobStatus};
use crate::models::token::{AccessToken, IssuedToken, NewAccessToken, TokenPurpose};

/// Random bytes per token secret.
const SECRET_BYTES: usize = 32;

/// Generate a fresh URL-safe bearer secret.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 digest of a secret, as stored.
pub fn hash_secret(secret: &str) -> Vec<u8> {
    Sha256::digest(secret.as_bytes()).to_vec()
}

/// Why a token was refused. Never shown to the caller; only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Rejection {
    UnknownToken,
    WrongPurpose,
    TokenExpired,
    JobMissing,
    WrongStatus,
    PastDueDate,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token rejected: {0}")]
    Rejected(Rejection),

    /// Issuing was tied to a status the job has since left.
    #[error("job is in {current}, not {expected}")]
    StatusChanged {
        current: JobStatus,
        expected: JobStatus,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A token that passed authentication, together with the job it unlocks.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub job: Job,
    pub token: AccessToken,
}

impl Authenticated {
    /// Claim to hand to a transition commit so the token is consumed with it.
    pub fn claim(&self) -> TokenClaim {
        TokenClaim {
            purpose: self.token.purpose,
            secret_hash: self.token.secret_hash.clone(),
        }
    }
}

/// Mints, validates and invalidates job-scoped bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn JobStore>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(store: Arc<dyn JobStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Build the row for a new token without storing it, so a transition
    /// can insert it in the same write that changes status.
    pub fn prepare(&self, job_id: Uuid, purpose: TokenPurpose) -> (IssuedToken, NewAccessToken) {
        let secret = generate_secret();
        let expires_at = Utc::now() + self.ttl;
        let row = NewAccessToken {
            job_id,
            purpose,
            secret_hash: hash_secret(&secret),
            expires_at,
        };
        let issued = IssuedToken {
            job_id,
            purpose,
            secret,
            expires_at,
        };
        (issued, row)
    }

    /// Mint and store a token, revoking any earlier token of the job. With
    /// `expected` set, the job must still be in that status when the token
    /// is written.
    pub async fn issue(
        &self,
        job_id: Uuid,
        purpose: TokenPurpose,
        expected: Option<JobStatus>,
    ) -> Result<IssuedToken, TokenError> {
        let (issued, row) = self.prepare(job_id, purpose);
        match self.store.issue_token(row, expected).await? {
            IssueOutcome::Issued(_) => {
                tracing::info!(job_id = %job_id, purpose = %purpose, "Access token issued");
                Ok(issued)
            }
            IssueOutcome::StatusMismatch { current: None } => {
                Err(StoreError::JobNotFound(job_id).into())
            }
            IssueOutcome::StatusMismatch {
                current: Some(current),
            } => {
                let expected = expected.unwrap_or(current);
                tracing::info!(
                    job_id = %job_id,
                    current = %current,
                    expected = %expected,
                    "Token not issued: job status changed"
                );
                Err(TokenError::StatusChanged { current, expected })
            }
        }
    }

    /// Check the secret, purpose, token expiry and job due date. The job
    /// status is not checked here.
    pub async fn authenticate(
        &self,
        job_id: Uuid,
        secret: &str,
        purpose: TokenPurpose,
    ) -> Result<Authenticated, TokenError> {
        self.authenticate_at(job_id, secret, Some(purpose), Utc::now())
            .await
    }

    /// Like [`TokenService::authenticate`] but accepts a live token of any
    /// purpose. The caller decides what the purpose allows.
    pub async fn authenticate_holder(
        &self,
        job_id: Uuid,
        secret: &str,
    ) -> Result<Authenticated, TokenError> {
        self.authenticate_at(job_id, secret, None, Utc::now()).await
    }

    async fn authenticate_at(
        &self,
        job_id: Uuid,
        secret: &str,
        purpose: Option<TokenPurpose>,
        now: DateTime<Utc>,
    ) -> Result<Authenticated, TokenError> {
        let reject = |reason: Rejection| {
            tracing::debug!(job_id = %job_id, reason = %reason, "Token rejected");
            TokenError::Rejected(reason)
        };

        let token = self
            .store
            .find_token(job_id, &hash_secret(secret))
            .await?
            .ok_or_else(|| reject(Rejection::UnknownToken))?;
        if purpose.is_some_and(|p| p != token.purpose) {
            return Err(reject(Rejection::WrongPurpose));
        }
        if !token.is_live(now) {
            return Err(reject(Rejection::TokenExpired));
        }

        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| reject(Rejection::JobMissing))?;
        if job.is_overdue(now.date_naive()) {
            return Err(reject(Rejection::PastDueDate));
        }

        Ok(Authenticated { job, token })
    }

    /// Full validation: [`TokenService::authenticate`] plus the job being in
    /// `expected_status`.
    pub async fn validate(
        &self,
        job_id: Uuid,
        secret: &str,
        purpose: TokenPurpose,
        expected_status: JobStatus,
    ) -> Result<Authenticated, TokenError> {
        let authenticated = self.authenticate(job_id, secret, purpose).await?;
        if authenticated.job.status != expected_status {
            tracing::debug!(
                job_id = %job_id,
                status = %authenticated.job.status,
                expected = %expected_status,
                "Token rejected: job not in expected status"
            );
            return Err(TokenError::Rejected(Rejection::WrongStatus));
        }
        Ok(authenticated)
    }

    /// Revoke every live token of the job.
    pub async fn invalidate(&self, job_id: Uuid) -> Result<u64, StoreError> {
        let revoked = self.store.revoke_tokens(job_id).await?;
        tracing::info!(job_id = %job_id, revoked, "Access tokens invalidated");
        Ok(revoked)
    }
}
