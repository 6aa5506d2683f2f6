use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Object key for a new document: `jobs/{job_id}/{uuid}.{ext}`, keeping the
/// original extension (lower-cased) when there is a usable one.
pub fn document_key(job_id: Uuid, file_name: &str) -> String {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase());

    match extension {
        Some(ext) => format!("jobs/{}/{}.{}", job_id, Uuid::new_v4(), ext),
        None => format!("jobs/{}/{}", job_id, Uuid::new_v4()),
    }
}

/// Append-only blob storage for uploaded documents.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key` and return its public URL. Fails with
    /// [`StorageError::AlreadyExists`] rather than overwriting.
    async fn put_new(&self, key: &str, data: &[u8], content_type: &str)
        -> Result<String, StorageError>;
}

/// Client for Cloudflare R2 object storage (S3-compatible).
pub struct R2Client {
    bucket: Box<Bucket>,
    public_base_url: String,
}

impl R2Client {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        public_base_url: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for R2Client {
    async fn put_new(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        let (_, head_status) = self.bucket.head_object(key).await?;
        match head_status {
            404 => {}
            200 => return Err(StorageError::AlreadyExists(key.to_string())),
            other => return Err(StorageError::Status(other)),
        }

        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await?;
        if !(200..300).contains(&response.status_code()) {
            return Err(StorageError::Status(response.status_code()));
        }

        Ok(format!("{}/{}", self.public_base_url, key))
    }
}

/// In-process blob store. Payloads registered with
/// [`MemoryBlobStore::reject_payload`] fail to store.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    rejected: Mutex<Vec<Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_payload(&self, data: &[u8]) {
        self.rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(data.to_vec());
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|(data, _)| data.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_new(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        if self
            .rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|r| r == data)
        {
            return Err(StorageError::Status(503));
        }

        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        if objects.contains_key(key) {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        objects.insert(key.to_string(), (data.to_vec(), content_type.to_string()));
        Ok(format!("memory://{key}"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage returned HTTP {0}")]
    Status(u16),
}
