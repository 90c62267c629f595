//! Video clip classifier on ONNX Runtime (VideoMAE-style input).
//!
//! Input `pixel_values` is `[1, T, 3, S, S]`: each frame resized so its short
//! side is `S`, center-cropped, rescaled to `[0, 1]` and normalized with the
//! ImageNet statistics. Output `logits` is `[1, num_labels]`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use ndarray::Array5;
use ort::session::Session;
use ort::value::{Tensor, Value};
use serde::Deserialize;
use tracing::{debug, warn};
use vreward_models::ComputeDevice;

use super::device::create_session;
use super::providers::{ClassificationModel, LoadedModel, ModelLoader};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Labels used when no label config is given, and for any class id the
/// config leaves unnamed or names generically (`LABEL_<id>`).
pub const DEFAULT_LABELS: &[&str] = &["simulator", "real"];

/// Frame preprocessing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConfig {
    /// Square crop side fed to the model
    pub crop_size: u32,
    pub image_mean: [f32; 3],
    pub image_std: [f32; 3],
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            crop_size: 224,
            image_mean: [0.485, 0.456, 0.406],
            image_std: [0.229, 0.224, 0.225],
        }
    }
}

/// Paths and preprocessing for the classification backend.
#[derive(Debug, Clone)]
pub struct ClassifierAssets {
    pub model_path: PathBuf,
    /// Explicit label config; [`DEFAULT_LABELS`] when unset
    pub labels_path: Option<PathBuf>,
    pub processor: ProcessorConfig,
}

#[derive(Debug, Deserialize)]
struct LabelConfig {
    #[serde(default)]
    id2label: Option<BTreeMap<String, String>>,
}

fn default_labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
}

/// Name for class `id` when the config has none or a generic one.
fn fallback_label(id: usize) -> String {
    DEFAULT_LABELS
        .get(id)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("LABEL_{}", id))
}

/// Load the label set from an `id2label` JSON config, indexed by class id.
///
/// No path, or a config without `id2label`, means the default labels. Ids the
/// config skips or names `LABEL_<id>` keep the default name for that index.
/// An unreadable or malformed file is an error.
pub fn load_labels(path: Option<&Path>) -> MediaResult<Vec<String>> {
    let Some(path) = path else {
        return Ok(default_labels());
    };

    let raw = std::fs::read_to_string(path)?;
    let config: LabelConfig = serde_json::from_str(&raw)?;

    let Some(id2label) = config.id2label.filter(|m| !m.is_empty()) else {
        warn!(path = %path.display(), "No id2label in label config, using default labels");
        return Ok(default_labels());
    };

    let mut named = BTreeMap::new();
    for (id, label) in id2label {
        let id: usize = id
            .parse()
            .map_err(|_| MediaError::internal(format!("Invalid class id in {}: {}", path.display(), id)))?;
        named.insert(id, label);
    }

    let len = named
        .keys()
        .next_back()
        .map_or(0, |max| max + 1)
        .max(DEFAULT_LABELS.len());
    Ok((0..len)
        .map(|id| match named.remove(&id) {
            Some(label) if label != format!("LABEL_{}", id) => label,
            _ => fallback_label(id),
        })
        .collect())
}

/// Loads [`OrtClassificationModel`].
pub struct OrtClassificationLoader {
    assets: ClassifierAssets,
}

impl OrtClassificationLoader {
    pub fn new(assets: ClassifierAssets) -> Self {
        Self { assets }
    }
}

impl ModelLoader<dyn ClassificationModel> for OrtClassificationLoader {
    fn is_available(&self) -> bool {
        self.assets.model_path.exists()
    }

    fn load(&self, device: ComputeDevice) -> MediaResult<LoadedModel<dyn ClassificationModel>> {
        let labels = load_labels(self.assets.labels_path.as_deref())?;
        let (session, device) = create_session(&self.assets.model_path, device)?;
        debug!(labels = ?labels, "Classifier labels loaded");

        Ok(LoadedModel {
            model: Box::new(OrtClassificationModel {
                session,
                labels,
                processor: self.assets.processor.clone(),
            }),
            device,
        })
    }

    fn describe(&self) -> String {
        format!("model={}", self.assets.model_path.display())
    }
}

pub struct OrtClassificationModel {
    session: Session,
    labels: Vec<String>,
    processor: ProcessorConfig,
}

impl OrtClassificationModel {
    fn preprocess(&self, window: &[Frame]) -> MediaResult<Value> {
        let size = self.processor.crop_size as usize;
        let mut input = Array5::<f32>::zeros((1, window.len(), 3, size, size));

        for (t, frame) in window.iter().enumerate() {
            let cropped = resize_and_crop(frame, self.processor.crop_size);
            for (x, y, pixel) in cropped.enumerate_pixels() {
                for c in 0..3 {
                    let value = pixel[c] as f32 / 255.0;
                    input[[0, t, c, y as usize, x as usize]] =
                        (value - self.processor.image_mean[c]) / self.processor.image_std[c];
                }
            }
        }

        let shape = input.shape().to_vec();
        Tensor::from_array((shape, input.into_raw_vec().into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::internal(format!("Failed to create tensor: {}", e)))
    }
}

impl ClassificationModel for OrtClassificationModel {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn logits(&mut self, window: &[Frame]) -> MediaResult<Vec<f32>> {
        if window.is_empty() {
            return Err(MediaError::inference("Empty frame window"));
        }
        let input = self.preprocess(window)?;

        let outputs = self
            .session
            .run(ort::inputs!["pixel_values" => input])
            .map_err(|e| MediaError::inference(format!("Classifier inference failed: {}", e)))?;

        let output = outputs
            .get("logits")
            .ok_or_else(|| MediaError::inference("Missing logits tensor"))?;
        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::inference(format!("Failed to extract logits: {}", e)))?;

        Ok(tensor.1.to_vec())
    }

    fn name(&self) -> &'static str {
        "ort-videomae"
    }
}

/// Resize so the short side is `size`, then center-crop to `size x size`.
fn resize_and_crop(frame: &Frame, size: u32) -> Frame {
    let (width, height) = frame.dimensions();
    if (width, height) == (size, size) {
        return frame.clone();
    }

    let short = width.min(height).max(1) as f32;
    let scale = size as f32 / short;
    let new_w = ((width as f32 * scale).round() as u32).max(size);
    let new_h = ((height as f32 * scale).round() as u32).max(size);
    let resized = image::imageops::resize(frame, new_w, new_h, FilterType::Triangle);

    let x = (new_w - size) / 2;
    let y = (new_h - size) / 2;
    image::imageops::crop_imm(&resized, x, y, size, size).to_image()
}
