use serde::Deserialize;

use crate::models::notification::Locale;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the notification retry queue
    pub redis_url: Option<String>,

    /// Base URL of the public upload/payment pages, used in emailed links
    pub public_base_url: String,

    /// Shared secret expected in the `x-internal-key` header of internal routes
    pub internal_api_key: String,

    /// Lifetime of an access token in hours, independent of the job's due date
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// Public base URL under which stored objects are served
    pub r2_public_url: String,

    /// Optional document processing hook (OCR / ledger integration)
    pub document_hook_url: Option<String>,

    #[serde(default = "default_hook_timeout_ms")]
    pub document_hook_timeout_ms: u64,

    /// Consecutive hook failures before the circuit opens
    #[serde(default = "default_hook_failure_threshold")]
    pub document_hook_failure_threshold: u32,

    #[serde(default = "default_hook_cooldown_secs")]
    pub document_hook_cooldown_secs: u64,

    /// Transactional mail API endpoint. Messages are only logged when unset.
    pub mail_api_url: Option<String>,

    pub mail_api_key: Option<String>,

    #[serde(default = "default_mail_from")]
    pub mail_from: String,

    /// Locale used when a recipient has no (supported) preferred language
    #[serde(default = "default_locale")]
    pub default_locale: Locale,

    /// Maximum request body size for uploads, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_token_ttl_hours() -> i64 {
    24 * 14
}

fn default_hook_timeout_ms() -> u64 {
    5_000
}

fn default_hook_failure_threshold() -> u32 {
    5
}

fn default_hook_cooldown_secs() -> u64 {
    60
}

fn default_mail_from() -> String {
    "billing@localhost".to_string()
}

fn default_locale() -> Locale {
    Locale::En
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
