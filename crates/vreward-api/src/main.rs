//! Video reward API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vreward_api::{create_router, metrics, ApiConfig, AppState};
use vreward_media::{check_ffmpeg, check_ffprobe, ModelAssetsConfig};
use vreward_worker::ScoringConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vreward-api");

    let config = ApiConfig::from_env();
    let scoring = ScoringConfig::from_env();
    info!(
        host = %config.host,
        port = config.port,
        max_file_size_mb = scoring.max_upload_mb(),
        timeout_seconds = scoring.chunk_timeout.as_secs(),
        "API config loaded"
    );

    for check in [check_ffmpeg(), check_ffprobe()] {
        if let Err(e) = check {
            warn!(error = %e, "Uploads will score 0 until FFmpeg is installed");
        }
    }

    let registry = Arc::new(ModelAssetsConfig::from_env().into_registry());
    let summary = registry.summary();
    info!(
        device = %summary.preferred_device,
        accelerator = summary.accelerator_available,
        "Compute device selected"
    );
    for status in &summary.backends {
        if !status.available {
            warn!(backend = %status.backend, "Model assets not found; backend disabled");
        }
    }

    let state = AppState::new(config.clone(), scoring, registry);
    state.score_log.initialize().await;

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("Failed to install Prometheus recorder")?)
    } else {
        None
    };

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for CTRL+C");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
