//! Fraud Scoring API - Main Entry Point
//!
//! Loads the model artifacts once, then serves predictions over HTTP.

use anyhow::{Context, Result};
use fraud_scoring_api::{
    config::AppConfig,
    http::{self, AppState},
    metrics::{MetricsReporter, ServiceMetrics},
    service::PredictionService,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load().context("failed to load configuration")?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "fraud_scoring_api={level},tower_http={level}",
            level = config.logging.level
        ))
    });
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting Fraud Scoring API");
    info!(
        "Detection threshold: {:.2}, batch failure policy: {:?}",
        config.detection.threshold, config.batch.failure_policy
    );

    // Load model artifacts; no serving without a model
    let service = PredictionService::from_config(&config).context("failed to load model artifacts")?;
    let service = Arc::new(service);
    info!(
        "Model loaded at {} ({} features)",
        service.loaded_at().to_rfc3339(),
        service.model_info().features_count
    );

    // Initialize metrics
    let metrics = Arc::new(ServiceMetrics::new());
    let reporter = MetricsReporter::new(metrics.clone(), config.logging.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let state = AppState {
        service,
        metrics: metrics.clone(),
        batch: config.batch.clone(),
    };
    let app = http::router(state, &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Print final summary
    info!("Scoring API shutting down...");
    metrics.log_summary();

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
