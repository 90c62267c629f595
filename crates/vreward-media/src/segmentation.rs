//! Segmentation stage: foreground-highlight rendering of an uploaded clip.
//!
//! Masks are proposed on the first frame, split into background and objects
//! by area, tracked through the clip, and rendered as a black video with the
//! non-background objects painted in the highlight color. Any failure yields
//! no artifact; the caller then classifies the raw clip.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use image::Rgb;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use vreward_models::BackendKind;

use crate::encode::VideoEncoder;
use crate::error::{MediaError, MediaResult};
use crate::frame::{Frame, FrameScale};
use crate::inference::ModelRegistry;
use crate::mask::{MaskSet, ObjectId, PointPrompt, ProposedMask};
use crate::sampler::FrameSampler;
use crate::temp_store::{TempArtifact, TempMediaStore};

/// Segmentation stage settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationConfig {
    pub enabled: bool,
    /// Frames wider than this are downscaled before segmentation
    pub max_width: u32,
    /// Area fraction at or above which a mask counts as background
    pub background_ratio: f64,
    pub highlight_color: [u8; 3],
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_width: 640,
            background_ratio: 0.2,
            highlight_color: [0, 255, 0],
        }
    }
}

/// Background/object split of the proposed masks, by rank index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskPartition {
    pub background: BTreeSet<ObjectId>,
    pub objects: BTreeSet<ObjectId>,
}

/// Split area-sorted masks into background and objects.
pub fn classify_masks_by_area(
    masks: &[ProposedMask],
    width: u32,
    height: u32,
    background_ratio: f64,
) -> MaskPartition {
    let total = (width as u64 * height as u64).max(1) as f64;
    let mut partition = MaskPartition::default();
    for (idx, mask) in masks.iter().enumerate() {
        let id = idx as ObjectId;
        if mask.area() as f64 / total >= background_ratio {
            partition.background.insert(id);
        } else {
            partition.objects.insert(id);
        }
    }
    partition
}

/// One positive centroid prompt per non-empty mask at frame 0, id = rank.
pub fn build_prompts(masks: &[ProposedMask]) -> Vec<PointPrompt> {
    masks
        .iter()
        .enumerate()
        .filter_map(|(idx, mask)| {
            let (x, y) = mask.mask.centroid()?;
            Some(PointPrompt {
                object_id: idx as ObjectId,
                frame_index: 0,
                x,
                y,
                positive: true,
            })
        })
        .collect()
}

/// Render `frame_count` black frames with non-background masks painted.
///
/// Frames without a mask set stay black.
pub fn render_foreground(
    frame_count: usize,
    width: u32,
    height: u32,
    mask_sets: &[MaskSet],
    background: &BTreeSet<ObjectId>,
    color: [u8; 3],
) -> Vec<Frame> {
    (0..frame_count)
        .into_par_iter()
        .map(|idx| {
            let mut frame = Frame::new(width, height);
            let Some(masks) = mask_sets.get(idx) else {
                return frame;
            };

            for (id, mask) in masks {
                if background.contains(id) {
                    continue;
                }
                let (mw, mh) = mask.dimensions();
                let (w, h) = (mw.min(width), mh.min(height));
                for (i, _) in mask.as_slice().iter().enumerate().filter(|(_, &set)| set) {
                    let (x, y) = ((i as u32) % mw, (i as u32) / mw);
                    if x < w && y < h {
                        frame.put_pixel(x, y, Rgb(color));
                    }
                }
            }
            frame
        })
        .collect()
}

/// Run mask proposal, tracking and rendering under the inference lock.
///
/// Blocking; call from `spawn_blocking`.
pub fn segment_frames(
    registry: &ModelRegistry,
    frames: &[Frame],
    config: &SegmentationConfig,
) -> MediaResult<Vec<Frame>> {
    let first = frames
        .first()
        .ok_or_else(|| MediaError::InvalidVideo("No frames extracted for segmentation".to_string()))?;
    let (width, height) = first.dimensions();

    let handle = registry.segmentation()?;
    let mut model = handle.lock()?;
    let _span = tracing::debug_span!("segment_frames", model = model.name(), device = %handle.device()).entered();

    let mut masks = model.generate_masks(first)?;
    if masks.is_empty() {
        return Err(MediaError::inference("Segmentation produced no masks"));
    }
    masks.sort_by_key(|m| std::cmp::Reverse(m.area()));

    let partition = classify_masks_by_area(&masks, width, height, config.background_ratio);
    let prompts = build_prompts(&masks);
    debug!(
        masks = masks.len(),
        background = partition.background.len(),
        objects = partition.objects.len(),
        "Masks classified"
    );

    let mask_sets = model.propagate(frames, &prompts)?;
    drop(model);

    Ok(render_foreground(
        frames.len(),
        width,
        height,
        &mask_sets,
        &partition.background,
        config.highlight_color,
    ))
}

/// Produces the segmented derivative of an upload, if it can.
#[derive(Clone)]
pub struct SegmentationStage {
    registry: Arc<ModelRegistry>,
    sampler: FrameSampler,
    encoder: Arc<dyn VideoEncoder>,
    store: TempMediaStore,
    config: SegmentationConfig,
}

impl SegmentationStage {
    pub fn new(
        registry: Arc<ModelRegistry>,
        sampler: FrameSampler,
        encoder: Arc<dyn VideoEncoder>,
        store: TempMediaStore,
        config: SegmentationConfig,
    ) -> Self {
        Self {
            registry,
            sampler,
            encoder,
            store,
            config,
        }
    }

    /// Whether the stage would attempt to run at all.
    pub fn is_available(&self) -> bool {
        self.config.enabled && self.registry.is_available(BackendKind::Segmentation)
    }

    /// Segment `input`; `None` (logged) on any failure.
    pub async fn run(&self, input: &Path) -> Option<TempArtifact> {
        match self.try_run(input).await {
            Ok(artifact) => Some(artifact),
            Err(e) if e.is_dependency_unavailable() => {
                warn!(stage = "segmentation", path = %input.display(), reason = %e, "Segmentation skipped");
                None
            }
            Err(e) => {
                warn!(stage = "segmentation", path = %input.display(), error = %e, "Segmentation failed");
                None
            }
        }
    }

    async fn try_run(&self, input: &Path) -> MediaResult<TempArtifact> {
        if !self.config.enabled {
            return Err(MediaError::dependency_unavailable(
                BackendKind::Segmentation,
                "disabled by configuration",
            ));
        }
        if !self.registry.is_available(BackendKind::Segmentation) {
            return Err(MediaError::dependency_unavailable(
                BackendKind::Segmentation,
                "model assets not found",
            ));
        }

        let video = self
            .sampler
            .decode_video(input, FrameScale::MaxWidth(self.config.max_width))
            .await
            .ok_or_else(|| MediaError::InvalidVideo("Unable to open video for segmentation".to_string()))?;
        if video.is_empty() {
            return Err(MediaError::InvalidVideo("No frames extracted for segmentation".to_string()));
        }

        let fps = video.fps;
        let registry = Arc::clone(&self.registry);
        let config = self.config.clone();
        let frames = video.frames;
        let rendered = tokio::task::spawn_blocking(move || segment_frames(&registry, &frames, &config))
            .await
            .map_err(|e| MediaError::internal(format!("Segmentation task failed: {}", e)))??;

        let artifact = self.store.acquire("_segmented.mp4")?;
        self.encoder.encode(&rendered, fps, artifact.path()).await?;

        info!(
            stage = "segmentation",
            path = %artifact.path().display(),
            frames = rendered.len(),
            encoder = self.encoder.name(),
            "Segmentation video written"
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::BinaryMask;
    use crate::testing::{
        fake_registry, FakeClassifierLoader, FakeSegmentationLoader, RecordingEncoder, SegmentationBehavior,
        SyntheticFrameSource,
    };
    use tempfile::TempDir;

    fn rect(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> ProposedMask {
        ProposedMask::new(BinaryMask::from_fn(w, h, |x, y| x >= x0 && x < x1 && y >= y0 && y < y1))
    }

    fn stage(
        dir: &TempDir,
        behavior: SegmentationBehavior,
        encoder: Arc<RecordingEncoder>,
        config: SegmentationConfig,
    ) -> SegmentationStage {
        SegmentationStage::new(
            fake_registry(FakeSegmentationLoader::with_behavior(behavior), FakeClassifierLoader::new(vec![0.0, 0.0])),
            FrameSampler::new(Arc::new(SyntheticFrameSource::new(10, 320, 240))),
            encoder,
            TempMediaStore::new(dir.path()),
            config,
        )
    }

    #[test]
    fn test_classify_masks_by_area() {
        let masks = vec![rect(10, 10, 0, 0, 10, 10), rect(10, 10, 0, 0, 5, 4), rect(10, 10, 0, 0, 2, 2)];
        let partition = classify_masks_by_area(&masks, 10, 10, 0.2);
        // 100% and exactly 20% are background, 4% is an object.
        assert_eq!(partition.background, BTreeSet::from([0, 1]));
        assert_eq!(partition.objects, BTreeSet::from([2]));
    }

    #[test]
    fn test_zero_area_masks_get_no_prompt() {
        let masks = vec![rect(10, 10, 0, 0, 4, 4), ProposedMask::new(BinaryMask::empty(10, 10))];
        let prompts = build_prompts(&masks);
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].object_id, 0);
        assert!((prompts[0].x - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_render_skips_background() {
        let bg = BinaryMask::from_fn(4, 4, |_, _| true);
        let obj = BinaryMask::from_fn(4, 4, |x, y| x == 1 && y == 2);
        let sets = vec![MaskSet::from([(0, bg), (1, obj)])];

        let frames = render_foreground(2, 4, 4, &sets, &BTreeSet::from([0]), [0, 255, 0]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].get_pixel(1, 2).0, [0, 255, 0]);
        assert_eq!(frames[0].get_pixel(0, 0).0, [0, 0, 0]);
        assert!(frames[1].pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[tokio::test]
    async fn test_static_scene_renders_blank_video() {
        let dir = TempDir::new().unwrap();
        let encoder = Arc::new(RecordingEncoder::new());
        let stage = stage(&dir, SegmentationBehavior::StaticScene, Arc::clone(&encoder), SegmentationConfig::default());

        let artifact = stage.run(Path::new("clip.mp4")).await.unwrap();
        assert!(artifact.path().exists());

        let clips = encoder.clips();
        assert_eq!(clips.len(), 1);
        assert_eq!((clips[0].frames, clips[0].width, clips[0].height), (10, 320, 240));
        assert_eq!(clips[0].lit_pixels, 0);
    }

    #[tokio::test]
    async fn test_objects_are_highlighted() {
        let dir = TempDir::new().unwrap();
        let encoder = Arc::new(RecordingEncoder::new());
        let stage = stage(&dir, SegmentationBehavior::CenterObject, Arc::clone(&encoder), SegmentationConfig::default());

        assert!(stage.run(Path::new("clip.mp4")).await.is_some());
        // 64x48 object on every one of 10 frames
        assert_eq!(encoder.clips()[0].lit_pixels, 64 * 48 * 10);
    }

    #[tokio::test]
    async fn test_failures_yield_none_and_leave_no_files() {
        for behavior in [SegmentationBehavior::NoMasks, SegmentationBehavior::Fail, SegmentationBehavior::Panic] {
            let dir = TempDir::new().unwrap();
            let stage = stage(&dir, behavior, Arc::new(RecordingEncoder::new()), SegmentationConfig::default());

            assert!(stage.run(Path::new("clip.mp4")).await.is_none(), "{:?}", behavior);
            assert!(TempMediaStore::new(dir.path()).list().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_encoder_failure_removes_artifact() {
        let dir = TempDir::new().unwrap();
        let stage = stage(
            &dir,
            SegmentationBehavior::StaticScene,
            Arc::new(RecordingEncoder::failing()),
            SegmentationConfig::default(),
        );

        assert!(stage.run(Path::new("clip.mp4")).await.is_none());
        assert!(TempMediaStore::new(dir.path()).list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_stage_is_skipped() {
        let dir = TempDir::new().unwrap();
        let encoder = Arc::new(RecordingEncoder::new());
        let config = SegmentationConfig {
            enabled: false,
            ..SegmentationConfig::default()
        };
        let stage = stage(&dir, SegmentationBehavior::StaticScene, Arc::clone(&encoder), config);

        assert!(!stage.is_available());
        assert!(stage.run(Path::new("clip.mp4")).await.is_none());
        assert!(encoder.clips().is_empty());
    }

    #[tokio::test]
    async fn test_wide_source_is_downscaled() {
        let dir = TempDir::new().unwrap();
        let encoder = Arc::new(RecordingEncoder::new());
        let stage = SegmentationStage::new(
            fake_registry(FakeSegmentationLoader::new(), FakeClassifierLoader::new(vec![0.0])),
            FrameSampler::new(Arc::new(SyntheticFrameSource::new(3, 1920, 1080))),
            Arc::clone(&encoder) as Arc<dyn VideoEncoder>,
            TempMediaStore::new(dir.path()),
            SegmentationConfig::default(),
        );

        assert!(stage.run(Path::new("clip.mp4")).await.is_some());
        let clip = &encoder.clips()[0];
        assert_eq!((clip.width, clip.height), (640, 360));
    }
}
