use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use mockup_studio::app_state::AppState;
use mockup_studio::config::AppConfig;
use mockup_studio::routes;
use mockup_studio::services::image_api::WorkersAiImageClient;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        model = %config.image_model,
        max_concurrent_jobs = config.max_concurrent_jobs,
        rate_limit_per_minute = config.rate_limit_per_minute,
        catalog_mode = ?config.catalog_mode(),
        "Initializing mockup-studio server"
    );

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!("mockup_batches_total", "Batches accepted for generation");
    metrics::describe_counter!("mockup_jobs_total", "Generation jobs submitted to the scheduler");
    metrics::describe_counter!("mockup_jobs_completed", "Generation jobs that produced an image");
    metrics::describe_counter!("mockup_jobs_failed", "Generation jobs that exhausted their retries");
    metrics::describe_counter!("mockup_job_retries", "Failed attempts that were requeued");
    metrics::describe_counter!("mockup_persona_failures", "Batches aborted by a failed persona lock");
    metrics::describe_counter!("mockup_rate_limit_waits", "Upstream calls delayed by the rate limiter");
    metrics::describe_histogram!("mockup_generation_seconds", "Duration of a single upstream generation call");
    metrics::describe_gauge!("mockup_jobs_in_flight", "Jobs currently in processing");

    tracing::info!("Initializing Cloudflare Workers AI client");
    let generator = WorkersAiImageClient::new(
        &config.cf_account_id,
        &config.cf_api_token,
        &config.image_model,
    )
    .expect("Failed to initialize Workers AI client");

    let state = AppState::new(&config, Arc::new(generator));

    let app = routes::app_router(state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(20 * 1024 * 1024)); // design images arrive inline

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
