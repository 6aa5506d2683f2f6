use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub store: ComponentHealth,
    pub retry_queue: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
    /// Notifications waiting for re-delivery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u64>,
}

impl ComponentHealth {
    fn ok(started: std::time::Instant) -> Self {
        Self {
            status: "ok".to_string(),
            latency_ms: Some(started.elapsed().as_millis() as u64),
            depth: None,
        }
    }

    fn error() -> Self {
        Self {
            status: "error".to_string(),
            latency_ms: None,
            depth: None,
        }
    }
}

/// GET /health: health check with dependency status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();
    let store_check = match state.store.ping().await {
        Ok(_) => ComponentHealth::ok(start),
        Err(_) => ComponentHealth::error(),
    };

    // The retry queue is optional; without it failed notifications are only logged.
    let queue_start = std::time::Instant::now();
    let queue_check = match &state.queue {
        Some(queue) => match queue.queue_depth().await {
            Ok(depth) => {
                metrics::gauge!("notification_retry_queue_depth").set(depth as f64);
                ComponentHealth {
                    depth: Some(depth),
                    ..ComponentHealth::ok(queue_start)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Retry queue health check failed");
                ComponentHealth::error()
            }
        },
        None => ComponentHealth {
            status: "disabled".to_string(),
            latency_ms: None,
            depth: None,
        },
    };

    let all_healthy = store_check.status == "ok" && queue_check.status != "error";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            store: store_check,
            retry_queue: queue_check,
        },
    };

    (status_code, Json(response))
}
