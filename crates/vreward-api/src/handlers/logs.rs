//! Score log tail handler.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_LINES: usize = 50;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub showing_lines: Option<usize>,
    pub logs: Vec<String>,
}

/// Most recent score log entries; `lines=0` returns the whole log.
pub async fn recent_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<LogsResponse>> {
    let lines = query.lines.unwrap_or(DEFAULT_LINES);

    let tail = state.score_log.tail(lines).await.map_err(|e| {
        error!(error = %e, "Failed to read logs");
        ApiError::internal(format!("Failed to read logs: {}", e)).redact(state.config.is_production())
    })?;

    Ok(Json(match tail {
        None => LogsResponse {
            message: Some("No log file found".to_string()),
            total_lines: None,
            showing_lines: None,
            logs: Vec::new(),
        },
        Some(tail) => LogsResponse {
            message: None,
            total_lines: Some(tail.total_lines),
            showing_lines: Some(tail.lines.len()),
            logs: tail.lines,
        },
    }))
}
