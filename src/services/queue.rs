use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::notification::OutboundMessage;

const QUEUE_KEY: &str = "invoice_workflow:notifications";
const PROCESSING_KEY: &str = "invoice_workflow:notifications:processing";

/// Failed notification serialized into Redis for re-delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedNotification {
    pub job_id: Uuid,
    pub message: OutboundMessage,
    pub attempts: u32,
}

/// Redis-backed retry queue for notifications whose delivery failed.
pub struct NotificationQueue {
    client: redis::Client,
}

impl NotificationQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    pub async fn enqueue(&self, item: &QueuedNotification) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(item)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload).await?;
        Ok(())
    }

    /// Pop the oldest entry, parking it in the processing list until
    /// [`NotificationQueue::complete`] is called. Returns the raw payload
    /// alongside so completion removes the exact entry.
    pub async fn dequeue(&self) -> Result<Option<(QueuedNotification, String)>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: Option<String> = conn.rpoplpush(QUEUE_KEY, PROCESSING_KEY).await?;

        match result {
            Some(payload) => {
                let item: QueuedNotification = serde_json::from_str(&payload)?;
                Ok(Some((item, payload)))
            }
            None => Ok(None),
        }
    }

    /// Remove an entry from the processing list.
    pub async fn complete(&self, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, payload).await?;
        Ok(())
    }

    /// Entries waiting for re-delivery. Also serves as the connectivity
    /// check for `/health`.
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let depth: u64 = conn.llen(QUEUE_KEY).await?;
        Ok(depth)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
