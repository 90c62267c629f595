//! Axum HTTP API for the video reward service.
//!
//! This crate provides:
//! - The upload endpoint that streams a clip into the scoring pipeline
//! - Health, status and score log endpoints
//! - The plain-text score log
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod score_log;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use score_log::{LogStats, ScoreLog};
pub use state::AppState;
