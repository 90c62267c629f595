//! Pipeline stage definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of the per-request scoring state machine.
///
/// Stages run strictly in declaration order; `Segmenting` may be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Ingesting,
    Segmenting,
    Classifying,
    Aggregating,
    CleaningUp,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Ingesting => "ingesting",
            PipelineStage::Segmenting => "segmenting",
            PipelineStage::Classifying => "classifying",
            PipelineStage::Aggregating => "aggregating",
            PipelineStage::CleaningUp => "cleaning_up",
            PipelineStage::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which artifact the classifier scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationTarget {
    /// The original upload (segmentation skipped or failed).
    #[default]
    Raw,
    /// The rendered foreground-highlight video.
    Segmented,
}

impl ClassificationTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationTarget::Raw => "raw",
            ClassificationTarget::Segmented => "segmented",
        }
    }
}

impl fmt::Display for ClassificationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering() {
        assert!(PipelineStage::Ingesting < PipelineStage::Segmenting);
        assert!(PipelineStage::Classifying < PipelineStage::Aggregating);
        assert!(PipelineStage::CleaningUp < PipelineStage::Done);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&PipelineStage::CleaningUp).unwrap(),
            "\"cleaning_up\""
        );
        assert_eq!(
            serde_json::to_string(&ClassificationTarget::Segmented).unwrap(),
            "\"segmented\""
        );
    }
}
