use invoice_workflow::{
    config::AppConfig,
    services::{
        mailer::Mailer,
        queue::{NotificationQueue, QueuedNotification},
    },
    startup,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const MAX_ATTEMPTS: u32 = 5;
const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    startup::init_tracing();

    tracing::info!("Starting notification retry worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let queue = startup::build_queue(&config)
        .expect("Failed to initialize notification queue")
        .expect("REDIS_URL is required for the retry worker");
    let mailer = startup::build_mailer(&config).expect("Failed to initialize mail transport");

    let pending = queue
        .queue_depth()
        .await
        .expect("Failed to reach the retry queue");
    metrics::gauge!("notification_retry_queue_depth").set(pending as f64);
    tracing::info!(pending, "Worker ready, starting retry loop");

    loop {
        match process_next(&queue, mailer.as_ref()).await {
            Ok(true) => {
                tracing::debug!("Notification processed, checking for next");
            }
            Ok(false) => {
                metrics::gauge!("notification_retry_queue_depth").set(0.0);
                tracing::trace!("Retry queue empty, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing retry queue, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Re-deliver the next queued notification.
/// Returns Ok(true) if an entry was processed, Ok(false) if the queue was empty.
async fn process_next(
    queue: &Arc<NotificationQueue>,
    mailer: &dyn Mailer,
) -> Result<bool, Box<dyn std::error::Error>> {
    let Some((item, payload)) = queue.dequeue().await? else {
        return Ok(false);
    };

    match mailer.send(&item.message).await {
        Ok(()) => {
            queue.complete(&payload).await?;
            metrics::counter!("notification_retries_total", "result" => "delivered").increment(1);
            tracing::info!(
                job_id = %item.job_id,
                kind = %item.message.kind,
                attempts = item.attempts + 1,
                "Queued notification delivered"
            );
        }
        Err(e) if item.attempts + 1 >= MAX_ATTEMPTS => {
            queue.complete(&payload).await?;
            metrics::counter!("notification_retries_total", "result" => "abandoned").increment(1);
            tracing::error!(
                job_id = %item.job_id,
                kind = %item.message.kind,
                attempts = item.attempts + 1,
                error = %e,
                "Notification abandoned after max attempts"
            );
        }
        Err(e) => {
            let retry = QueuedNotification {
                attempts: item.attempts + 1,
                ..item
            };
            queue.enqueue(&retry).await?;
            queue.complete(&payload).await?;
            metrics::counter!("notification_retries_total", "result" => "requeued").increment(1);
            tracing::warn!(
                job_id = %retry.job_id,
                attempts = retry.attempts,
                error = %e,
                "Notification delivery failed again, re-queued"
            );
            // Back off a little so a failing transport is not hammered.
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    Ok(true)
}
