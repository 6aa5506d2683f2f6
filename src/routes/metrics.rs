use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics: Prometheus text exposition of workflow counters
/// (transitions, uploads, notifications, hook fallbacks).
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for every metric the service records.
pub fn describe() {
    metrics::describe_counter!(
        "workflow_transitions_total",
        "Job status transitions committed, by target status"
    );
    metrics::describe_counter!(
        "workflow_status_overrides_total",
        "Privileged status overrides"
    );
    metrics::describe_counter!(
        "document_uploads_total",
        "Provider upload batches, by result"
    );
    metrics::describe_histogram!(
        "document_upload_seconds",
        "Time to store, enrich and record an upload batch"
    );
    metrics::describe_counter!(
        "document_hook_fallbacks_total",
        "Uploads that fell back to the direct storage reference"
    );
    metrics::describe_counter!("payments_confirmed_total", "Payments confirmed by payers");
    metrics::describe_counter!("notifications_sent_total", "Notifications delivered");
    metrics::describe_counter!(
        "notifications_failed_total",
        "Notifications not delivered, by reason"
    );
    metrics::describe_gauge!(
        "notification_retry_queue_depth",
        "Notifications waiting in the retry queue"
    );
    metrics::describe_counter!(
        "notification_retries_total",
        "Queued notifications re-delivered by the worker, by result"
    );
}
