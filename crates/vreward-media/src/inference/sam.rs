//! Promptable segmentation on ONNX Runtime (SAM-style encoder/decoder).
//!
//! The encoder turns a frame into image embeddings once; the decoder then
//! answers point prompts against those embeddings. Automatic proposal runs
//! a grid of single-point prompts, filters by predicted IoU and stability,
//! then drops near-duplicates. Tracking re-prompts every frame with the
//! previous mask's centroid and low-resolution logits.

use std::collections::BTreeMap;
use std::path::PathBuf;

use image::imageops::FilterType;
use ndarray::{Array4, ArrayD};
use ort::session::Session;
use ort::value::{DynValue, Tensor, Value};
use tracing::debug;
use vreward_models::{BackendKind, ComputeDevice};

use super::device::create_session;
use super::providers::{LoadedModel, ModelLoader, SegmentationModel};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::mask::{BinaryMask, MaskSet, ObjectId, PointPrompt, ProposedMask};

/// Encoder input side; frames are resized so their long side matches.
pub const ENCODER_INPUT_SIZE: u32 = 1024;
const LOW_RES_MASK_SIZE: usize = 256;
const PIXEL_MEAN: [f32; 3] = [123.675, 116.28, 103.53];
const PIXEL_STD: [f32; 3] = [58.395, 57.12, 57.375];

/// Automatic mask proposal tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskGeneratorConfig {
    /// Grid prompts per image side
    pub points_per_side: u32,
    /// Minimum predicted mask quality
    pub pred_iou_thresh: f32,
    /// Minimum stability under logit threshold shifts
    pub stability_score_thresh: f32,
    /// Logit shift used for the stability score
    pub stability_score_offset: f32,
    /// Masks overlapping a better one above this IoU are dropped
    pub dedupe_iou_thresh: f32,
    /// Masks with fewer pixels are dropped
    pub min_mask_area: u64,
}

impl Default for MaskGeneratorConfig {
    fn default() -> Self {
        Self {
            points_per_side: 24,
            pred_iou_thresh: 0.75,
            stability_score_thresh: 0.92,
            stability_score_offset: 1.0,
            dedupe_iou_thresh: 0.7,
            min_mask_area: 1,
        }
    }
}

/// Paths and tuning for the segmentation backend.
#[derive(Debug, Clone)]
pub struct SegmentationAssets {
    pub encoder_path: PathBuf,
    pub decoder_path: PathBuf,
    pub generator: MaskGeneratorConfig,
}

/// Loads [`OrtSegmentationModel`] from its two graphs.
pub struct OrtSegmentationLoader {
    assets: SegmentationAssets,
}

impl OrtSegmentationLoader {
    pub fn new(assets: SegmentationAssets) -> Self {
        Self { assets }
    }
}

impl ModelLoader<dyn SegmentationModel> for OrtSegmentationLoader {
    fn is_available(&self) -> bool {
        self.assets.encoder_path.exists() && self.assets.decoder_path.exists()
    }

    fn load(&self, device: ComputeDevice) -> MediaResult<LoadedModel<dyn SegmentationModel>> {
        let (encoder, device) = create_session(&self.assets.encoder_path, device)?;
        let (decoder, _) = create_session(&self.assets.decoder_path, device)?;

        Ok(LoadedModel {
            model: Box::new(OrtSegmentationModel {
                encoder,
                decoder,
                generator: self.assets.generator.clone(),
            }),
            device,
        })
    }

    fn describe(&self) -> String {
        format!(
            "encoder={}, decoder={}",
            self.assets.encoder_path.display(),
            self.assets.decoder_path.display()
        )
    }
}

/// Encoder output for one frame, built as a tensor once and lent to every
/// decoder call on that frame.
struct Embedding {
    tensor: Value,
    /// Frame-to-encoder coordinate scale
    scale: f32,
    width: u32,
    height: u32,
}

/// Decoder answer for one prompt: candidate masks with their quality.
struct Prediction {
    /// Full-resolution logits per candidate
    masks: Vec<Vec<f32>>,
    ious: Vec<f32>,
    /// 256x256 logits per candidate, fed back when tracking
    low_res: Vec<Vec<f32>>,
}

impl Prediction {
    fn best(&self) -> Option<usize> {
        self.ious
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, _)| idx)
    }
}

struct Track {
    start_frame: usize,
    clicks: Vec<(f32, f32, f32)>,
    anchor: (f32, f32),
    low_res: Option<Vec<f32>>,
}

pub struct OrtSegmentationModel {
    encoder: Session,
    decoder: Session,
    generator: MaskGeneratorConfig,
}

impl OrtSegmentationModel {
    fn embed(&mut self, frame: &Frame) -> MediaResult<Embedding> {
        let (width, height) = frame.dimensions();
        let scale = ENCODER_INPUT_SIZE as f32 / width.max(height).max(1) as f32;
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, ENCODER_INPUT_SIZE);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, ENCODER_INPUT_SIZE);
        let resized = image::imageops::resize(frame, new_w, new_h, FilterType::Triangle);

        // Normalized pixels top-left aligned, zero padding elsewhere.
        let side = ENCODER_INPUT_SIZE as usize;
        let mut input = Array4::<f32>::zeros((1, 3, side, side));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - PIXEL_MEAN[c]) / PIXEL_STD[c];
            }
        }

        let outputs = self
            .encoder
            .run(ort::inputs![array_value(input.into_dyn())?])
            .map_err(|e| MediaError::inference(format!("Encoder inference failed: {}", e)))?;
        let (shape, data) = extract(outputs.get("image_embeddings"), "image_embeddings")?;

        Ok(Embedding {
            tensor: tensor(shape, data)?,
            scale,
            width,
            height,
        })
    }

    fn predict(
        &mut self,
        embedding: &Embedding,
        points: &[(f32, f32, f32)],
        mask_input: Option<&[f32]>,
    ) -> MediaResult<Prediction> {
        let n = points.len() + 1;
        let mut coords = Vec::with_capacity(n * 2);
        let mut labels = Vec::with_capacity(n);
        for &(x, y, label) in points {
            coords.push(x * embedding.scale);
            coords.push(y * embedding.scale);
            labels.push(label);
        }
        // Padding point, required when no box prompt is given.
        coords.extend([0.0, 0.0]);
        labels.push(-1.0);

        let low_res_len = LOW_RES_MASK_SIZE * LOW_RES_MASK_SIZE;
        let (mask, has_mask) = match mask_input {
            Some(m) if m.len() == low_res_len => (m.to_vec(), 1.0),
            _ => (vec![0.0; low_res_len], 0.0),
        };

        let inputs = ort::inputs![
            "image_embeddings" => &embedding.tensor,
            "point_coords" => tensor(vec![1, n, 2], coords)?,
            "point_labels" => tensor(vec![1, n], labels)?,
            "mask_input" => tensor(vec![1, 1, LOW_RES_MASK_SIZE, LOW_RES_MASK_SIZE], mask)?,
            "has_mask_input" => tensor(vec![1], vec![has_mask])?,
            "orig_im_size" => tensor(vec![2], vec![embedding.height as f32, embedding.width as f32])?,
        ];

        let outputs = self
            .decoder
            .run(inputs)
            .map_err(|e| MediaError::inference(format!("Decoder inference failed: {}", e)))?;

        let (_, ious) = extract(outputs.get("iou_predictions"), "iou_predictions")?;
        let (_, masks) = extract(outputs.get("masks"), "masks")?;
        let (_, low_res) = extract(outputs.get("low_res_masks"), "low_res_masks")?;

        let candidates = ious.len();
        let mask_len = embedding.width as usize * embedding.height as usize;
        if candidates == 0 || masks.len() != candidates * mask_len || low_res.len() != candidates * low_res_len {
            return Err(MediaError::inference(format!(
                "Unexpected decoder output sizes: {} ious, {} mask values, {} low-res values",
                candidates,
                masks.len(),
                low_res.len()
            )));
        }

        Ok(Prediction {
            masks: masks.chunks_exact(mask_len).map(<[f32]>::to_vec).collect(),
            ious,
            low_res: low_res.chunks_exact(low_res_len).map(<[f32]>::to_vec).collect(),
        })
    }
}

impl SegmentationModel for OrtSegmentationModel {
    fn generate_masks(&mut self, frame: &Frame) -> MediaResult<Vec<ProposedMask>> {
        let embedding = self.embed(frame)?;
        let config = self.generator.clone();
        let n = config.points_per_side.max(1);

        let mut candidates = Vec::new();
        for j in 0..n {
            for i in 0..n {
                let x = (i as f32 + 0.5) / n as f32 * embedding.width as f32;
                let y = (j as f32 + 0.5) / n as f32 * embedding.height as f32;

                let mut prediction = self.predict(&embedding, &[(x, y, 1.0)], None)?;
                let Some(best) = prediction.best() else {
                    continue;
                };
                let predicted_iou = prediction.ious[best];
                if predicted_iou < config.pred_iou_thresh {
                    continue;
                }

                let logits = prediction.masks.swap_remove(best);
                let stability = stability_score(&logits, config.stability_score_offset);
                if stability < config.stability_score_thresh {
                    continue;
                }

                let Some(mask) = BinaryMask::from_logits(embedding.width, embedding.height, &logits, 0.0) else {
                    continue;
                };
                if mask.area() < config.min_mask_area.max(1) {
                    continue;
                }

                candidates.push(ProposedMask {
                    mask,
                    predicted_iou,
                    stability_score: stability,
                });
            }
        }

        let proposed = candidates.len();
        let masks = dedupe_masks(candidates, config.dedupe_iou_thresh);
        debug!(proposed, kept = masks.len(), "Automatic mask proposal complete");
        Ok(masks)
    }

    fn propagate(&mut self, frames: &[Frame], prompts: &[PointPrompt]) -> MediaResult<Vec<MaskSet>> {
        let mut tracks: BTreeMap<ObjectId, Track> = BTreeMap::new();
        let start_of = |id: ObjectId| {
            prompts
                .iter()
                .filter(|p| p.object_id == id)
                .map(|p| p.frame_index)
                .min()
                .unwrap_or(0)
        };
        for prompt in prompts {
            let start_frame = start_of(prompt.object_id);
            if prompt.frame_index != start_frame {
                continue;
            }
            let label = if prompt.positive { 1.0 } else { 0.0 };
            tracks
                .entry(prompt.object_id)
                .or_insert_with(|| Track {
                    start_frame,
                    clicks: Vec::new(),
                    anchor: (prompt.x, prompt.y),
                    low_res: None,
                })
                .clicks
                .push((prompt.x, prompt.y, label));
        }

        let mut results = Vec::with_capacity(frames.len());
        for (idx, frame) in frames.iter().enumerate() {
            if !tracks.values().any(|t| t.start_frame <= idx) {
                results.push(MaskSet::new());
                continue;
            }

            let embedding = self.embed(frame)?;
            let mut masks = MaskSet::new();
            for (&id, track) in tracks.iter_mut() {
                if track.start_frame > idx {
                    continue;
                }

                let points = if idx == track.start_frame {
                    track.clicks.clone()
                } else {
                    vec![(track.anchor.0, track.anchor.1, 1.0)]
                };
                let mut prediction = self.predict(&embedding, &points, track.low_res.as_deref())?;
                let Some(best) = prediction.best() else {
                    continue;
                };

                let mask = BinaryMask::from_logits(
                    embedding.width,
                    embedding.height,
                    &prediction.masks[best],
                    0.0,
                )
                .unwrap_or_else(|| BinaryMask::empty(embedding.width, embedding.height));
                if let Some(centroid) = mask.centroid() {
                    track.anchor = centroid;
                }
                track.low_res = Some(prediction.low_res.swap_remove(best));
                masks.insert(id, mask);
            }
            results.push(masks);
        }

        debug!(
            frames = results.len(),
            objects = tracks.len(),
            backend = %BackendKind::Segmentation,
            "Propagation complete"
        );
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "ort-sam"
    }
}

/// IoU between the mask at logit threshold `+offset` and at `-offset`.
pub fn stability_score(logits: &[f32], offset: f32) -> f32 {
    let intersections = logits.iter().filter(|&&v| v > offset).count();
    let unions = logits.iter().filter(|&&v| v > -offset).count();
    if unions == 0 {
        0.0
    } else {
        intersections as f32 / unions as f32
    }
}

/// Keep masks in descending predicted-IoU order, dropping any that overlap
/// an already kept mask above `iou_thresh`.
pub fn dedupe_masks(mut masks: Vec<ProposedMask>, iou_thresh: f32) -> Vec<ProposedMask> {
    masks.sort_by(|a, b| b.predicted_iou.total_cmp(&a.predicted_iou));

    let mut kept: Vec<ProposedMask> = Vec::with_capacity(masks.len());
    for candidate in masks {
        if kept.iter().all(|k| k.mask.iou(&candidate.mask) <= iou_thresh) {
            kept.push(candidate);
        }
    }
    kept
}

fn tensor(shape: Vec<usize>, data: Vec<f32>) -> MediaResult<Value> {
    Tensor::from_array((shape, data.into_boxed_slice()))
        .map(Value::from)
        .map_err(|e| MediaError::internal(format!("Failed to create tensor: {}", e)))
}

fn array_value(array: ArrayD<f32>) -> MediaResult<Value> {
    let shape = array.shape().to_vec();
    tensor(shape, array.into_raw_vec())
}

fn extract(output: Option<&DynValue>, name: &str) -> MediaResult<(Vec<usize>, Vec<f32>)> {
    let output = output.ok_or_else(|| MediaError::inference(format!("Missing {} tensor", name)))?;
    let (shape, data) = output
        .try_extract_tensor::<f32>()
        .map_err(|e| MediaError::inference(format!("Failed to extract {}: {}", name, e)))?;
    Ok((
        shape.iter().map(|&d| d.max(0) as usize).collect(),
        data.to_vec(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: u32, x0: u32, x1: u32, iou: f32) -> ProposedMask {
        ProposedMask {
            mask: BinaryMask::from_fn(size, size, |x, _| x >= x0 && x < x1),
            predicted_iou: iou,
            stability_score: 1.0,
        }
    }

    #[test]
    fn test_stability_score() {
        assert_eq!(stability_score(&[5.0, 5.0, 0.5, -0.5, -5.0], 1.0), 0.5);
        assert_eq!(stability_score(&[-5.0, -5.0], 1.0), 0.0);
        assert_eq!(stability_score(&[3.0, 4.0], 1.0), 1.0);
    }

    #[test]
    fn test_dedupe_keeps_best_of_overlapping() {
        let masks = vec![
            square(10, 0, 5, 0.80),
            square(10, 0, 6, 0.95),
            square(10, 6, 10, 0.90),
        ];
        let kept = dedupe_masks(masks, 0.7);

        assert_eq!(kept.len(), 2);
        assert!((kept[0].predicted_iou - 0.95).abs() < 1e-6);
        assert!((kept[1].predicted_iou - 0.90).abs() < 1e-6);
    }

    #[test]
    fn test_generator_defaults() {
        let config = MaskGeneratorConfig::default();
        assert_eq!(config.points_per_side, 24);
        assert!((config.pred_iou_thresh - 0.75).abs() < 1e-6);
        assert!((config.stability_score_thresh - 0.92).abs() < 1e-6);
    }

    #[test]
    fn test_loader_unavailable_without_assets() {
        let loader = OrtSegmentationLoader::new(SegmentationAssets {
            encoder_path: PathBuf::from("/nonexistent/encoder.onnx"),
            decoder_path: PathBuf::from("/nonexistent/decoder.onnx"),
            generator: MaskGeneratorConfig::default(),
        });
        assert!(!loader.is_available());
        assert!(loader.describe().contains("encoder.onnx"));
    }
}
