//! Shared data models for the video reward service.
//!
//! This crate provides Serde-serializable types for:
//! - Episode/attempt identification of uploads
//! - Inference backends and compute devices
//! - Pipeline stages and the reward outcome returned to callers

pub mod backend;
pub mod episode;
pub mod pipeline;
pub mod reward;

// Re-export common types
pub use backend::{BackendKind, BackendStatus, ComputeDevice, DeviceSummary};
pub use episode::EpisodeKey;
pub use pipeline::{ClassificationTarget, PipelineStage};
pub use reward::{RewardOutcome, UploadResponse};
