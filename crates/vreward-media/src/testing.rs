//! Deterministic fakes for the frame source, encoder and both backends.
//!
//! Compiled for unit tests and behind the `testing` feature for dependent
//! crates' tests. Nothing here touches FFmpeg or ONNX Runtime.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::Rgb;
use vreward_models::ComputeDevice;

use crate::decode::FrameSource;
use crate::encode::VideoEncoder;
use crate::error::{MediaError, MediaResult};
use crate::frame::{DecodedVideo, Frame, FrameScale};
use crate::inference::providers::{ClassificationModel, LoadedModel, ModelLoader, SegmentationModel};
use crate::inference::registry::ModelRegistry;
use crate::mask::{BinaryMask, MaskSet, PointPrompt, ProposedMask};

/// Frame source producing a fixed synthetic clip.
///
/// Frame `i` is a uniform gray of intensity `i % 256`, so tests can tell
/// frames apart after sampling.
#[derive(Debug)]
pub struct SyntheticFrameSource {
    frames: usize,
    width: u32,
    height: u32,
    fps: f64,
    fail: bool,
    decoded: Mutex<Vec<PathBuf>>,
}

impl SyntheticFrameSource {
    pub fn new(frames: usize, width: u32, height: u32) -> Self {
        Self {
            frames,
            width,
            height,
            fps: 30.0,
            fail: false,
            decoded: Mutex::new(Vec::new()),
        }
    }

    /// A source that cannot open anything.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(0, 1, 1)
        }
    }

    /// Paths decoded so far, in call order.
    pub fn decoded_paths(&self) -> Vec<PathBuf> {
        self.decoded.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl FrameSource for SyntheticFrameSource {
    async fn decode(&self, path: &Path, scale: FrameScale) -> MediaResult<DecodedVideo> {
        if let Ok(mut decoded) = self.decoded.lock() {
            decoded.push(path.to_path_buf());
        }
        if self.fail {
            return Err(MediaError::InvalidVideo("synthetic decode failure".to_string()));
        }

        let (width, height) = scale.target_dimensions(self.width, self.height);
        let frames = (0..self.frames)
            .map(|i| {
                let v = (i % 256) as u8;
                Frame::from_pixel(width, height, Rgb([v, v, v]))
            })
            .collect();

        Ok(DecodedVideo {
            frames,
            width,
            height,
            fps: self.fps,
        })
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

/// What one recorded encode looked like.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedClip {
    pub frames: usize,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Non-black pixels across all frames
    pub lit_pixels: u64,
}

/// Encoder that writes a placeholder file and records what it was given.
#[derive(Debug, Default)]
pub struct RecordingEncoder {
    fail: bool,
    clips: Mutex<Vec<EncodedClip>>,
}

impl RecordingEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn clips(&self) -> Vec<EncodedClip> {
        self.clips.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VideoEncoder for RecordingEncoder {
    async fn encode(&self, frames: &[Frame], fps: f64, output: &Path) -> MediaResult<()> {
        if self.fail {
            return Err(MediaError::ffmpeg_failed("synthetic encode failure", None, Some(1)));
        }
        let first = frames
            .first()
            .ok_or_else(|| MediaError::InvalidVideo("No frames to encode".to_string()))?;

        let lit_pixels = frames
            .iter()
            .flat_map(|f| f.pixels())
            .filter(|p| p.0 != [0, 0, 0])
            .count() as u64;
        tokio::fs::write(output, b"encoded").await?;

        if let Ok(mut clips) = self.clips.lock() {
            clips.push(EncodedClip {
                frames: frames.len(),
                width: first.width(),
                height: first.height(),
                fps,
                lit_pixels,
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Scripted behavior of the fake segmentation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationBehavior {
    /// One full-frame mask: everything is background.
    StaticScene,
    /// Full-frame background plus a small centered object.
    CenterObject,
    /// Mask proposal returns nothing.
    NoMasks,
    /// Mask proposal returns an error.
    Fail,
    /// Mask proposal panics.
    Panic,
}

pub struct FakeSegmentationModel {
    behavior: SegmentationBehavior,
    proposals: Vec<BinaryMask>,
}

impl SegmentationModel for FakeSegmentationModel {
    fn generate_masks(&mut self, frame: &Frame) -> MediaResult<Vec<ProposedMask>> {
        let (w, h) = frame.dimensions();
        let mut masks = match self.behavior {
            SegmentationBehavior::StaticScene => vec![BinaryMask::from_fn(w, h, |_, _| true)],
            SegmentationBehavior::CenterObject => vec![
                BinaryMask::from_fn(w, h, |_, _| true),
                BinaryMask::from_fn(w, h, |x, y| {
                    x >= w * 2 / 5 && x < w * 3 / 5 && y >= h * 2 / 5 && y < h * 3 / 5
                }),
            ],
            SegmentationBehavior::NoMasks => Vec::new(),
            SegmentationBehavior::Fail => {
                return Err(MediaError::inference("synthetic mask proposal failure"))
            }
            SegmentationBehavior::Panic => panic!("synthetic segmentation panic"),
        };
        masks.sort_by_key(|m| std::cmp::Reverse(m.area()));
        self.proposals = masks.clone();
        Ok(masks.into_iter().map(ProposedMask::new).collect())
    }

    fn propagate(&mut self, frames: &[Frame], prompts: &[PointPrompt]) -> MediaResult<Vec<MaskSet>> {
        Ok(frames
            .iter()
            .map(|_| {
                prompts
                    .iter()
                    .filter_map(|p| {
                        self.proposals
                            .get(p.object_id as usize)
                            .map(|m| (p.object_id, m.clone()))
                    })
                    .collect()
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "fake-segmentation"
    }
}

pub struct FakeSegmentationLoader {
    available: bool,
    behavior: SegmentationBehavior,
    loads: Arc<AtomicUsize>,
}

impl FakeSegmentationLoader {
    pub fn new() -> Self {
        Self::with_behavior(SegmentationBehavior::StaticScene)
    }

    pub fn with_behavior(behavior: SegmentationBehavior) -> Self {
        Self {
            available: true,
            behavior,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.loads)
    }
}

impl Default for FakeSegmentationLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelLoader<dyn SegmentationModel> for FakeSegmentationLoader {
    fn is_available(&self) -> bool {
        self.available
    }

    fn load(&self, device: ComputeDevice) -> MediaResult<LoadedModel<dyn SegmentationModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(LoadedModel {
            model: Box::new(FakeSegmentationModel {
                behavior: self.behavior,
                proposals: Vec::new(),
            }),
            device,
        })
    }

    fn describe(&self) -> String {
        format!("fake segmentation ({:?})", self.behavior)
    }
}

/// Scripted behavior of the fake classifier at inference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierBehavior {
    Logits,
    Fail,
    Panic,
    /// Block the inference thread for the given time, then return the logits.
    Stall(Duration),
}

pub struct FakeClassifier {
    labels: Vec<String>,
    logits: Vec<f32>,
    behavior: ClassifierBehavior,
    calls: Arc<AtomicUsize>,
}

impl ClassificationModel for FakeClassifier {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn logits(&mut self, window: &[Frame]) -> MediaResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            ClassifierBehavior::Logits if window.is_empty() => {
                Err(MediaError::inference("empty window"))
            }
            ClassifierBehavior::Logits => Ok(self.logits.clone()),
            ClassifierBehavior::Fail => Err(MediaError::inference("synthetic classifier failure")),
            ClassifierBehavior::Panic => panic!("synthetic classifier panic"),
            ClassifierBehavior::Stall(delay) => {
                std::thread::sleep(delay);
                Ok(self.logits.clone())
            }
        }
    }

    fn name(&self) -> &'static str {
        "fake-classifier"
    }
}

pub struct FakeClassifierLoader {
    available: bool,
    labels: Vec<String>,
    logits: Vec<f32>,
    behavior: ClassifierBehavior,
    load_delay: Option<Duration>,
    failing_loads: AtomicUsize,
    loads: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl FakeClassifierLoader {
    /// Classifier over `["simulator", "real"]` always returning `logits`.
    pub fn new(logits: Vec<f32>) -> Self {
        Self {
            available: true,
            labels: vec!["simulator".to_string(), "real".to_string()],
            logits,
            behavior: ClassifierBehavior::Logits,
            load_delay: None,
            failing_loads: AtomicUsize::new(0),
            loads: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn with_labels<S: Into<String>>(mut self, labels: impl IntoIterator<Item = S>) -> Self {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_behavior(mut self, behavior: ClassifierBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Fail the first `n` load attempts.
    pub fn failing_loads(self, n: usize) -> Self {
        self.failing_loads.store(n, Ordering::SeqCst);
        self
    }

    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.loads)
    }

    /// Number of windows the loaded classifier was asked to score.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl ModelLoader<dyn ClassificationModel> for FakeClassifierLoader {
    fn is_available(&self) -> bool {
        self.available
    }

    fn load(&self, device: ComputeDevice) -> MediaResult<LoadedModel<dyn ClassificationModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.load_delay {
            std::thread::sleep(delay);
        }

        let remaining = self.failing_loads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_loads.store(remaining - 1, Ordering::SeqCst);
            return Err(MediaError::internal("synthetic load failure"));
        }

        Ok(LoadedModel {
            model: Box::new(FakeClassifier {
                labels: self.labels.clone(),
                logits: self.logits.clone(),
                behavior: self.behavior,
                calls: Arc::clone(&self.calls),
            }),
            device,
        })
    }

    fn describe(&self) -> String {
        format!("fake classifier ({} labels)", self.labels.len())
    }
}

/// Registry over two fakes, bound to the CPU.
pub fn fake_registry(
    segmentation: FakeSegmentationLoader,
    classification: FakeClassifierLoader,
) -> Arc<ModelRegistry> {
    Arc::new(ModelRegistry::with_device(
        Box::new(segmentation),
        Box::new(classification),
        ComputeDevice::Cpu,
    ))
}

