//! Reward outcome and upload response schemas.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ClassificationTarget, EpisodeKey, PipelineStage};

/// Result of scoring one uploaded clip.
///
/// Always produced once ingestion succeeded; internal failures show up as a
/// zero reward with a `reason`, never as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RewardOutcome {
    pub episode: EpisodeKey,
    /// Reward in `[0, 1]`.
    pub reward: f64,
    /// Seconds spent in segmentation and classification.
    pub analysis_time: f64,
    /// Size of the ingested upload in bytes.
    pub upload_bytes: u64,
    pub target: ClassificationTarget,
    /// Number of frame windows that produced a score.
    pub windows_scored: usize,
    /// Stages visited, in order.
    pub stages: Vec<PipelineStage>,
    /// Why the reward degraded to the neutral value, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RewardOutcome {
    /// Whether the reward came from at least one classified window.
    pub fn is_scored(&self) -> bool {
        self.windows_scored > 0
    }
}

/// Response body of the upload endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UploadResponse {
    pub status: String,
    /// Always `None`: uploads are never persisted.
    pub filename: Option<String>,
    pub episode_number: Option<i64>,
    pub reward: f64,
    pub analysis_time: f64,
}

impl From<&RewardOutcome> for UploadResponse {
    fn from(outcome: &RewardOutcome) -> Self {
        Self {
            status: "ok".to_string(),
            filename: None,
            episode_number: Some(outcome.episode.episode_number),
            reward: outcome.reward,
            analysis_time: outcome.analysis_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(windows_scored: usize) -> RewardOutcome {
        RewardOutcome {
            episode: EpisodeKey::new(7, 2),
            reward: 0.5,
            analysis_time: 1.25,
            upload_bytes: 1024,
            target: ClassificationTarget::Raw,
            windows_scored,
            stages: vec![PipelineStage::Ingesting, PipelineStage::Done],
            reason: None,
        }
    }

    #[test]
    fn test_upload_response_from_outcome() {
        let response = UploadResponse::from(&outcome(4));
        assert_eq!(response.status, "ok");
        assert_eq!(response.filename, None);
        assert_eq!(response.episode_number, Some(7));
        assert!((response.reward - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reason_omitted_when_absent() {
        let json = serde_json::to_value(outcome(0)).unwrap();
        assert!(json.get("reason").is_none());
        assert!(!outcome(0).is_scored());
        assert!(outcome(1).is_scored());
    }
}
