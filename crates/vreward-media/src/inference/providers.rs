//! Provider traits for the inference backends.
//!
//! Models are stateful and not thread-safe; the registry hands them out
//! behind a per-backend inference lock, so methods take `&mut self`.

use vreward_models::ComputeDevice;

use crate::error::MediaResult;
use crate::frame::Frame;
use crate::mask::{MaskSet, PointPrompt, ProposedMask};

/// Promptable video object segmentation.
pub trait SegmentationModel: Send {
    /// Automatic mask proposal on a single frame.
    fn generate_masks(&mut self, frame: &Frame) -> MediaResult<Vec<ProposedMask>>;

    /// Track prompted objects through `frames`.
    ///
    /// Returns one mask set per frame, keyed by the prompts' object ids.
    fn propagate(&mut self, frames: &[Frame], prompts: &[PointPrompt]) -> MediaResult<Vec<MaskSet>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Video clip classification.
pub trait ClassificationModel: Send {
    /// Class labels, indexed like the logits.
    fn labels(&self) -> &[String];

    /// Raw class logits for one window of frames.
    fn logits(&mut self, window: &[Frame]) -> MediaResult<Vec<f32>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// A freshly loaded model and the device it ended up on.
pub struct LoadedModel<M: ?Sized> {
    pub model: Box<M>,
    pub device: ComputeDevice,
}

/// Builds one backend's model on demand.
pub trait ModelLoader<M: ?Sized>: Send + Sync {
    /// Whether runtime and assets are present; cheap, no loading.
    fn is_available(&self) -> bool;

    /// Load the model, preferring `device`.
    fn load(&self, device: ComputeDevice) -> MediaResult<LoadedModel<M>>;

    /// Short description for logs (e.g. asset paths).
    fn describe(&self) -> String;
}
