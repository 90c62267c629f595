//! Health and status handlers.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use vreward_models::DeviceSummary;

use crate::score_log::LogStats;
use crate::state::AppState;

pub const ENDPOINTS: &[&str] = &["/health", "/upload/video", "/status", "/logs"];

fn served_endpoints(metrics_enabled: bool) -> Vec<String> {
    let mut endpoints: Vec<String> = ENDPOINTS.iter().map(|e| e.to_string()).collect();
    if metrics_enabled {
        endpoints.push("/metrics".to_string());
    }
    endpoints
}

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub version: String,
    /// Unix time in seconds
    pub timestamp: f64,
    pub max_file_size_mb: f64,
    pub timeout_seconds: u64,
    pub gpu: DeviceSummary,
}

/// Liveness check used by clients before uploading.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
        max_file_size_mb: state.scoring.max_upload_mb(),
        timeout_seconds: state.scoring.chunk_timeout.as_secs(),
        gpu: state.registry().summary(),
    })
}

/// Status response.
#[derive(Serialize)]
pub struct StatusResponse {
    pub server: String,
    pub status: String,
    pub version: String,
    pub uptime_seconds: f64,
    pub max_file_size_mb: f64,
    pub timeout_seconds: u64,
    pub log_directory: String,
    pub score_log_file: String,
    pub log_statistics: LogStats,
    pub gpu: DeviceSummary,
    pub endpoints: Vec<String>,
}

pub async fn server_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let log_statistics = state.score_log.stats().await;

    Json(StatusResponse {
        server: "Video Reward Server".to_string(),
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs_f64(),
        max_file_size_mb: state.scoring.max_upload_mb(),
        timeout_seconds: state.scoring.chunk_timeout.as_secs(),
        log_directory: state.score_log.dir().display().to_string(),
        score_log_file: state.score_log.path().display().to_string(),
        log_statistics,
        gpu: state.registry().summary(),
        endpoints: served_endpoints(state.config.metrics_enabled),
    })
}
