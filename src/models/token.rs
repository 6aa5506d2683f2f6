use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::job::JobStatus;

/// Class of external action a token authorizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TokenPurpose {
    Upload,
    Payment,
}

impl TokenPurpose {
    /// Job status a token of this purpose is scoped to.
    pub fn scoped_status(self) -> JobStatus {
        match self {
            TokenPurpose::Upload => JobStatus::PendingInvoice,
            TokenPurpose::Payment => JobStatus::PendingPayment,
        }
    }
}

/// A stored access token. Only the SHA-256 digest of the secret is kept.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub id: Uuid,
    pub job_id: Uuid,
    pub purpose: TokenPurpose,
    pub secret_hash: Vec<u8>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Token row to insert; the plaintext secret never reaches the store.
#[derive(Debug, Clone)]
pub struct NewAccessToken {
    pub job_id: Uuid,
    pub purpose: TokenPurpose,
    pub secret_hash: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

/// A freshly minted token, returned once to the caller that embeds it in a link.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub job_id: Uuid,
    pub purpose: TokenPurpose,
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}
