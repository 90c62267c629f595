//! Inference backends: device selection, the model registry, and the ONNX
//! Runtime segmentation and classification models.

pub mod device;
pub mod providers;
pub mod registry;
pub mod sam;
pub mod scoring;
pub mod videomae;

use std::path::PathBuf;

pub use device::{create_session, preferred_device};
pub use providers::{ClassificationModel, LoadedModel, ModelLoader, SegmentationModel};
pub use registry::{ModelHandle, ModelRegistry, ModelSlot};
pub use sam::{MaskGeneratorConfig, OrtSegmentationLoader, SegmentationAssets};
pub use scoring::{mean_score, positive_class_score, softmax};
pub use videomae::{ClassifierAssets, OrtClassificationLoader, ProcessorConfig, DEFAULT_LABELS};

/// Model asset locations, read once at startup.
#[derive(Debug, Clone)]
pub struct ModelAssetsConfig {
    pub segmentation: SegmentationAssets,
    pub classification: ClassifierAssets,
}

impl Default for ModelAssetsConfig {
    fn default() -> Self {
        Self {
            segmentation: SegmentationAssets {
                encoder_path: PathBuf::from("models/segmentation/encoder.onnx"),
                decoder_path: PathBuf::from("models/segmentation/decoder.onnx"),
                generator: MaskGeneratorConfig::default(),
            },
            classification: ClassifierAssets {
                model_path: PathBuf::from("models/video_classifier/model.onnx"),
                labels_path: None,
                processor: ProcessorConfig::default(),
            },
        }
    }
}

impl ModelAssetsConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let generator = MaskGeneratorConfig {
            points_per_side: env_parse("SEGMENT_POINTS_PER_SIDE", defaults.segmentation.generator.points_per_side),
            pred_iou_thresh: env_parse("SEGMENT_PRED_IOU_THRESH", defaults.segmentation.generator.pred_iou_thresh),
            stability_score_thresh: env_parse(
                "SEGMENT_STABILITY_THRESH",
                defaults.segmentation.generator.stability_score_thresh,
            ),
            dedupe_iou_thresh: env_parse("SEGMENT_DEDUPE_IOU_THRESH", defaults.segmentation.generator.dedupe_iou_thresh),
            ..defaults.segmentation.generator
        };

        Self {
            segmentation: SegmentationAssets {
                encoder_path: env_path("SEGMENT_ENCODER_PATH").unwrap_or(defaults.segmentation.encoder_path),
                decoder_path: env_path("SEGMENT_DECODER_PATH").unwrap_or(defaults.segmentation.decoder_path),
                generator,
            },
            classification: ClassifierAssets {
                model_path: env_path("VIDEO_CLASS_MODEL_PATH").unwrap_or(defaults.classification.model_path),
                labels_path: env_path("VIDEO_CLASS_LABELS_PATH"),
                processor: defaults.classification.processor,
            },
        }
    }

    /// Registry backed by ONNX Runtime loaders for these assets.
    pub fn into_registry(self) -> ModelRegistry {
        ModelRegistry::new(
            Box::new(OrtSegmentationLoader::new(self.segmentation)),
            Box::new(OrtClassificationLoader::new(self.classification)),
        )
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
