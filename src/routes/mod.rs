pub mod health;
pub mod internal;
pub mod metrics;
pub mod public;

use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

/// Workflow, internal and health routes. Layers and `/metrics` are added by
/// the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        // Public, token-authorized
        .route(
            "/api/v1/public/jobs/{job_id}/access",
            get(public::validate_access),
        )
        .route(
            "/api/v1/public/jobs/{job_id}/documents",
            post(public::upload_documents),
        )
        .route(
            "/api/v1/public/jobs/{job_id}/payment",
            post(public::confirm_payment),
        )
        // Internal, key-authorized
        .route("/internal/jobs", post(internal::create_job))
        .route("/internal/jobs/{job_id}", get(internal::get_job))
        .route(
            "/internal/jobs/{job_id}/line-items",
            post(internal::add_line_item),
        )
        .route(
            "/internal/jobs/{job_id}/transitions",
            post(internal::apply_transition),
        )
        .route(
            "/internal/jobs/{job_id}/override",
            post(internal::override_status),
        )
        .route(
            "/internal/jobs/{job_id}/notify",
            post(internal::notify_status_change),
        )
        .route(
            "/internal/jobs/{job_id}/tokens",
            post(internal::issue_token).delete(internal::invalidate_tokens),
        )
        .with_state(state)
}
