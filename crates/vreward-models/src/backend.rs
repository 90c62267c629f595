//! Inference backend and compute device definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the two inference subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Promptable video object segmentation.
    Segmentation,
    /// Video clip classification.
    Classification,
}

impl BackendKind {
    pub const ALL: &'static [BackendKind] = &[BackendKind::Segmentation, BackendKind::Classification];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Segmentation => "segmentation",
            BackendKind::Classification => "classification",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown backend: {0}")]
pub struct ParseBackendError(String);

impl FromStr for BackendKind {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "segmentation" | "sam" => Ok(BackendKind::Segmentation),
            "classification" | "classifier" => Ok(BackendKind::Classification),
            _ => Err(ParseBackendError(s.to_string())),
        }
    }
}

/// Compute device a model is bound to.
///
/// Chosen once per process; accelerators are preferred over the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComputeDevice {
    /// NVIDIA GPU through the CUDA execution provider.
    Cuda { ordinal: u32 },
    /// Apple Neural Engine / GPU through CoreML.
    CoreMl,
    /// General-purpose CPU execution.
    Cpu,
}

impl ComputeDevice {
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, ComputeDevice::Cpu)
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Cuda { ordinal } => write!(f, "cuda:{}", ordinal),
            ComputeDevice::CoreMl => write!(f, "coreml"),
            ComputeDevice::Cpu => write!(f, "cpu"),
        }
    }
}

/// Load state of one backend, as reported by health endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BackendStatus {
    pub backend: BackendKind,
    /// Whether the backend's runtime and model assets are present.
    pub available: bool,
    /// Device the loaded model is bound to; `None` until first use.
    pub device: Option<ComputeDevice>,
    /// Number of completed initializations (0 or 1 in a healthy process).
    pub initializations: usize,
}

/// Device overview of the running process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceSummary {
    pub preferred_device: ComputeDevice,
    pub accelerator_available: bool,
    pub backends: Vec<BackendStatus>,
}
