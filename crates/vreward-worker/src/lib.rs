//! Upload ingestion and reward scoring for the video reward service.
//!
//! This crate provides:
//! - Streaming upload ingestion with size, content type and per-chunk
//!   timeout limits
//! - The per-upload pipeline: segmentation with fallback, classification,
//!   aggregation and unconditional cleanup
//! - Scoring configuration, structured episode logging and pipeline metrics

pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod processor;

pub use config::ScoringConfig;
pub use error::{IngestError, IngestResult};
pub use ingest::{precheck, IngestLimits, UploadArtifact, UploadRequest};
pub use logging::EpisodeLogger;
pub use processor::RewardProcessor;
