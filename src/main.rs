use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use invoice_workflow::app_state::AppState;
use invoice_workflow::config::AppConfig;
use invoice_workflow::db::{self, JobStore, PgJobStore};
use invoice_workflow::{routes, startup};

#[tokio::main]
async fn main() {
    startup::init_tracing();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing invoice-workflow server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe();

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(db_pool));

    let queue = startup::build_queue(&config).expect("Failed to initialize notification queue");
    if queue.is_none() {
        tracing::warn!("REDIS_URL not set, failed notifications will not be retried");
    }

    // Validates the template registry before accepting traffic
    let workflow = startup::build_workflow(&config, store.clone(), queue.clone())
        .expect("Failed to initialize workflow");

    let state = AppState::new(workflow, store, queue, &config.internal_api_key);

    let app = routes::router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes));

    tracing::info!("Starting invoice-workflow on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
