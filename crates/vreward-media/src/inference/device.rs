//! Compute device selection and ONNX Runtime session creation.
//!
//! The device is chosen once per process, preferring an accelerator:
//! - CUDA on Linux with NVIDIA GPU (when `cuda` feature enabled)
//! - CoreML on macOS
//! - CPU fallback on all platforms

use std::path::Path;
use std::sync::OnceLock;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tracing::{debug, info, warn};
use vreward_models::ComputeDevice;

use crate::error::{MediaError, MediaResult};

static PREFERRED_DEVICE: OnceLock<ComputeDevice> = OnceLock::new();

/// Device models should be bound to, detected on first call.
pub fn preferred_device() -> ComputeDevice {
    *PREFERRED_DEVICE.get_or_init(|| {
        let device = detect_device();
        info!(device = %device, "Selected compute device");
        device
    })
}

fn detect_device() -> ComputeDevice {
    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
        match CUDAExecutionProvider::default().is_available() {
            Ok(true) => return ComputeDevice::Cuda { ordinal: 0 },
            Ok(false) => debug!("CUDA execution provider not available"),
            Err(e) => debug!(error = %e, "CUDA availability check failed"),
        }
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::{CoreMLExecutionProvider, ExecutionProvider};
        match CoreMLExecutionProvider::default().is_available() {
            Ok(true) => return ComputeDevice::CoreMl,
            Ok(false) => debug!("CoreML execution provider not available"),
            Err(e) => debug!(error = %e, "CoreML availability check failed"),
        }
    }

    ComputeDevice::Cpu
}

/// Create a session for `model_path` on `device`.
///
/// Falls back to the CPU when the accelerator cannot host the model; the
/// returned device is the one the session actually runs on.
pub fn create_session(model_path: &Path, device: ComputeDevice) -> MediaResult<(Session, ComputeDevice)> {
    if !model_path.exists() {
        return Err(MediaError::model_not_found(model_path.display().to_string()));
    }

    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::internal(format!("Failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    match device {
        #[cfg(all(target_os = "linux", feature = "cuda"))]
        ComputeDevice::Cuda { ordinal } => {
            use ort::execution_providers::CUDAExecutionProvider;
            if let Ok(cuda_builder) = builder.clone().with_execution_providers([
                CUDAExecutionProvider::default()
                    .with_device_id(ordinal as i32)
                    .build(),
            ]) {
                if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                    info!(model = %model_path.display(), device = %device, "Session created");
                    return Ok((session, device));
                }
            }
            warn!(model = %model_path.display(), "CUDA session failed, falling back to CPU");
        }
        #[cfg(target_os = "macos")]
        ComputeDevice::CoreMl => {
            use ort::execution_providers::CoreMLExecutionProvider;
            if let Ok(coreml_builder) = builder
                .clone()
                .with_execution_providers([CoreMLExecutionProvider::default().build()])
            {
                if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                    info!(model = %model_path.display(), device = %device, "Session created");
                    return Ok((session, device));
                }
            }
            warn!(model = %model_path.display(), "CoreML session failed, falling back to CPU");
        }
        ComputeDevice::Cpu => {}
        other => debug!(device = %other, "Execution provider not compiled in, using CPU"),
    }

    let session = builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))?;
    info!(model = %model_path.display(), device = "cpu", "Session created");
    Ok((session, ComputeDevice::Cpu))
}
