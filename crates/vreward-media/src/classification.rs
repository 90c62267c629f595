//! Classification stage: mean positive-class probability over frame windows.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, warn};
use vreward_models::BackendKind;

use crate::error::MediaResult;
use crate::frame::Frame;
use crate::inference::{mean_score, positive_class_score, softmax, ModelRegistry};
use crate::sampler::{FrameSampler, WindowConfig};

/// Classification stage settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationConfig {
    pub windows: WindowConfig,
    /// Label whose probability is the score
    pub positive_label: String,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            windows: WindowConfig::default(),
            positive_label: "real".to_string(),
        }
    }
}

/// Reward of one clip and how it came about.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    /// Mean window score in `[0, 1]`
    pub reward: f64,
    pub windows_scored: usize,
    /// Why the reward is the neutral 0, if it is
    pub reason: Option<String>,
}

impl ClassificationReport {
    pub fn zero(reason: impl Into<String>) -> Self {
        Self {
            reward: 0.0,
            windows_scored: 0,
            reason: Some(reason.into()),
        }
    }
}

/// Score every non-empty window under the inference lock.
///
/// Blocking; call from `spawn_blocking`.
pub fn score_windows(
    registry: &ModelRegistry,
    windows: &[Vec<Frame>],
    positive_label: &str,
) -> MediaResult<ClassificationReport> {
    let handle = registry.classification()?;
    let mut model = handle.lock()?;
    let _span = tracing::debug_span!("score_windows", model = model.name(), device = %handle.device()).entered();
    let labels = model.labels().to_vec();

    let mut scores = Vec::with_capacity(windows.len());
    for window in windows.iter().filter(|w| !w.is_empty()) {
        let logits = model.logits(window)?;
        if let Some(score) = positive_class_score(&softmax(&logits), &labels, positive_label) {
            scores.push(score);
        }
    }
    drop(model);

    if scores.is_empty() {
        return Ok(ClassificationReport::zero("classifier produced no scores"));
    }

    debug!(scores = ?scores, "Window scores");
    Ok(ClassificationReport {
        reward: mean_score(&scores),
        windows_scored: scores.len(),
        reason: None,
    })
}

/// Turns a clip into a reward; never fails.
#[derive(Clone)]
pub struct ClassificationStage {
    registry: Arc<ModelRegistry>,
    sampler: FrameSampler,
    config: ClassificationConfig,
}

impl ClassificationStage {
    pub fn new(registry: Arc<ModelRegistry>, sampler: FrameSampler, config: ClassificationConfig) -> Self {
        Self {
            registry,
            sampler,
            config,
        }
    }

    pub fn is_available(&self) -> bool {
        self.registry.is_available(BackendKind::Classification)
    }

    /// Score `path`; any failure becomes a zero reward with a reason.
    pub async fn score(&self, path: &Path) -> ClassificationReport {
        if !self.is_available() {
            warn!(stage = "classification", "Video classifier not available; returning 0 score");
            return ClassificationReport::zero("classification backend unavailable");
        }

        let windows = self.sampler.windows(path, &self.config.windows).await;
        if windows.is_empty() {
            warn!(
                stage = "classification",
                path = %path.display(),
                "No frame windows available for classification; returning 0 score"
            );
            return ClassificationReport::zero("no frame windows available");
        }

        let registry = Arc::clone(&self.registry);
        let positive = self.config.positive_label.clone();
        match tokio::task::spawn_blocking(move || score_windows(&registry, &windows, &positive)).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                error!(stage = "classification", path = %path.display(), error = %e, "Video classification failed");
                ClassificationReport::zero(e.to_string())
            }
            Err(e) => {
                error!(stage = "classification", path = %path.display(), error = %e, "Classification task aborted");
                ClassificationReport::zero(format!("classification task aborted: {}", e))
            }
        }
    }
}
