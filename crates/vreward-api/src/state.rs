//! Application state.

use std::sync::Arc;
use std::time::Instant;

use vreward_media::ModelRegistry;
use vreward_worker::{RewardProcessor, ScoringConfig};

use crate::config::ApiConfig;
use crate::score_log::ScoreLog;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub scoring: ScoringConfig,
    pub processor: RewardProcessor,
    pub score_log: Arc<ScoreLog>,
    pub started_at: Instant,
}

impl AppState {
    /// State with the FFmpeg-backed processor over `registry`.
    pub fn new(config: ApiConfig, scoring: ScoringConfig, registry: Arc<ModelRegistry>) -> Self {
        let processor = RewardProcessor::new(&scoring, registry);
        Self::with_processor(config, scoring, processor)
    }

    pub fn with_processor(config: ApiConfig, scoring: ScoringConfig, processor: RewardProcessor) -> Self {
        let score_log = Arc::new(ScoreLog::new(config.score_log_dir.clone()));
        Self {
            config,
            scoring,
            processor,
            score_log,
            started_at: Instant::now(),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.processor.registry()
    }
}
