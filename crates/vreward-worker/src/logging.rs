//! Structured per-upload logging.
//!
//! Every line carries the episode and attempt numbers so one request can be
//! followed through the pipeline.

use tracing::{error, info, warn, Span};
use vreward_models::EpisodeKey;

/// Logger bound to one upload attempt and pipeline operation.
#[derive(Debug, Clone)]
pub struct EpisodeLogger {
    episode: EpisodeKey,
    operation: String,
}

impl EpisodeLogger {
    /// # Arguments
    /// * `episode` - The upload being processed
    /// * `operation` - The type of operation (e.g., "ingest", "reward_scoring")
    pub fn new(episode: EpisodeKey, operation: &str) -> Self {
        Self {
            episode,
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            episode = self.episode.episode_number,
            attempt = self.episode.attempt_number,
            operation = %self.operation,
            "Started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            episode = self.episode.episode_number,
            attempt = self.episode.attempt_number,
            operation = %self.operation,
            "Progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            episode = self.episode.episode_number,
            attempt = self.episode.attempt_number,
            operation = %self.operation,
            "Warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            episode = self.episode.episode_number,
            attempt = self.episode.attempt_number,
            operation = %self.operation,
            "Error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            episode = self.episode.episode_number,
            attempt = self.episode.attempt_number,
            operation = %self.operation,
            "Completed: {}", message
        );
    }

    pub fn episode(&self) -> EpisodeKey {
        self.episode
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span for instrumenting the stages of one upload.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "episode",
            episode = self.episode.episode_number,
            attempt = self.episode.attempt_number,
            operation = %self.operation
        )
    }
}
