#![deny(unreachable_patterns)]
//! Media and inference layer of the video reward service.
//!
//! This crate provides:
//! - FFmpeg decoding into RGB frames and encoding of rendered frames
//! - Fixed-length frame window sampling for classification
//! - Scoped temp files that are removed on every exit path
//! - A process-wide model registry with lazy, once-only initialization
//! - ONNX Runtime segmentation and classification backends
//! - The segmentation and classification pipeline stages

pub mod classification;
pub mod command;
pub mod decode;
pub mod encode;
pub mod error;
pub mod frame;
pub mod inference;
pub mod mask;
pub mod probe;
pub mod sampler;
pub mod segmentation;
pub mod temp_store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use classification::{ClassificationConfig, ClassificationReport, ClassificationStage};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand};
pub use decode::{FfmpegFrameSource, FrameSource};
pub use encode::{FfmpegEncoder, VideoEncoder};
pub use error::{MediaError, MediaResult};
pub use frame::{downscale_dimensions, DecodedVideo, Frame, FrameScale};
pub use inference::{ModelAssetsConfig, ModelHandle, ModelRegistry};
pub use mask::{BinaryMask, MaskSet, ObjectId, PointPrompt, ProposedMask};
pub use probe::{probe_video, VideoInfo};
pub use sampler::{sample_windows, window_starts, FrameSampler, WindowConfig};
pub use segmentation::{SegmentationConfig, SegmentationStage};
pub use temp_store::{TempArtifact, TempMediaStore};
