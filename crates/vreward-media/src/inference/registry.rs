//! Process-wide model registry.
//!
//! One slot per backend. A slot initializes its model at most once, on first
//! use, with double-checked locking on a dedicated init lock; afterwards the
//! handle is returned without touching that lock. Inference is serialized by
//! a second lock inside the handle. Failed initializations are not cached.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Instant;

use tracing::{error, info, warn};
use vreward_models::{BackendKind, BackendStatus, ComputeDevice, DeviceSummary};

use super::device::preferred_device;
use super::providers::{ClassificationModel, LoadedModel, ModelLoader, SegmentationModel};
use crate::error::{MediaError, MediaResult};

/// A loaded model bound to its device.
pub struct ModelHandle<M: ?Sized> {
    backend: BackendKind,
    device: ComputeDevice,
    model: Mutex<Box<M>>,
}

impl<M: ?Sized> ModelHandle<M> {
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    /// Acquire the inference lock. Blocks; call from blocking context.
    ///
    /// Models keep no state between calls, so a lock poisoned by a panicking
    /// caller is taken over rather than failing every later request.
    pub fn lock(&self) -> MediaResult<MutexGuard<'_, Box<M>>> {
        Ok(self.model.lock().unwrap_or_else(|poisoned| {
            warn!(backend = %self.backend, "Recovering poisoned inference lock");
            poisoned.into_inner()
        }))
    }
}

/// Lazily initialized model for one backend.
pub struct ModelSlot<M: ?Sized> {
    backend: BackendKind,
    loader: Box<dyn ModelLoader<M>>,
    init_lock: Mutex<()>,
    handle: OnceLock<Arc<ModelHandle<M>>>,
    initializations: AtomicUsize,
}

impl<M: ?Sized> ModelSlot<M> {
    pub fn new(backend: BackendKind, loader: Box<dyn ModelLoader<M>>) -> Self {
        Self {
            backend,
            loader,
            init_lock: Mutex::new(()),
            handle: OnceLock::new(),
            initializations: AtomicUsize::new(0),
        }
    }

    pub fn is_available(&self) -> bool {
        self.handle.get().is_some() || self.loader.is_available()
    }

    /// Completed initializations (0 or 1).
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }

    /// Get the handle, loading the model on first use. Blocks while loading.
    pub fn get(&self, device: ComputeDevice) -> MediaResult<Arc<ModelHandle<M>>> {
        if let Some(handle) = self.handle.get() {
            return Ok(Arc::clone(handle));
        }

        // A loader that panicked left nothing behind in the slot.
        let _guard = self
            .init_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Another caller may have finished while we waited.
        if let Some(handle) = self.handle.get() {
            return Ok(Arc::clone(handle));
        }

        if !self.loader.is_available() {
            return Err(MediaError::dependency_unavailable(
                self.backend,
                format!("assets not found ({})", self.loader.describe()),
            ));
        }

        info!(
            backend = %self.backend,
            device = %device,
            assets = %self.loader.describe(),
            "Loading model"
        );
        let start = Instant::now();

        let LoadedModel { model, device } = self.loader.load(device).map_err(|e| {
            error!(backend = %self.backend, error = %e, "Model initialization failed");
            match e {
                e @ MediaError::DependencyUnavailable { .. } => e,
                other => MediaError::dependency_unavailable(self.backend, other.to_string()),
            }
        })?;

        let handle = Arc::new(ModelHandle {
            backend: self.backend,
            device,
            model: Mutex::new(model),
        });
        self.initializations.fetch_add(1, Ordering::SeqCst);
        let handle = Arc::clone(self.handle.get_or_init(|| handle));

        info!(
            backend = %self.backend,
            device = %device,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model ready"
        );
        Ok(handle)
    }

    pub fn status(&self) -> BackendStatus {
        BackendStatus {
            backend: self.backend,
            available: self.is_available(),
            device: self.handle.get().map(|h| h.device()),
            initializations: self.initializations(),
        }
    }
}

/// Both backends plus the process device choice.
pub struct ModelRegistry {
    device: ComputeDevice,
    segmentation: ModelSlot<dyn SegmentationModel>,
    classification: ModelSlot<dyn ClassificationModel>,
}

impl ModelRegistry {
    /// Registry on the process-preferred device.
    pub fn new(
        segmentation: Box<dyn ModelLoader<dyn SegmentationModel>>,
        classification: Box<dyn ModelLoader<dyn ClassificationModel>>,
    ) -> Self {
        Self::with_device(segmentation, classification, preferred_device())
    }

    pub fn with_device(
        segmentation: Box<dyn ModelLoader<dyn SegmentationModel>>,
        classification: Box<dyn ModelLoader<dyn ClassificationModel>>,
        device: ComputeDevice,
    ) -> Self {
        Self {
            device,
            segmentation: ModelSlot::new(BackendKind::Segmentation, segmentation),
            classification: ModelSlot::new(BackendKind::Classification, classification),
        }
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    pub fn segmentation(&self) -> MediaResult<Arc<ModelHandle<dyn SegmentationModel>>> {
        self.segmentation.get(self.device)
    }

    pub fn classification(&self) -> MediaResult<Arc<ModelHandle<dyn ClassificationModel>>> {
        self.classification.get(self.device)
    }

    pub fn is_available(&self, backend: BackendKind) -> bool {
        match backend {
            BackendKind::Segmentation => self.segmentation.is_available(),
            BackendKind::Classification => self.classification.is_available(),
        }
    }

    pub fn initializations(&self, backend: BackendKind) -> usize {
        match backend {
            BackendKind::Segmentation => self.segmentation.initializations(),
            BackendKind::Classification => self.classification.initializations(),
        }
    }

    pub fn status(&self, backend: BackendKind) -> BackendStatus {
        match backend {
            BackendKind::Segmentation => self.segmentation.status(),
            BackendKind::Classification => self.classification.status(),
        }
    }

    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            preferred_device: self.device,
            accelerator_available: self.device.is_accelerator(),
            backends: BackendKind::ALL.iter().map(|b| self.status(*b)).collect(),
        }
    }
}
