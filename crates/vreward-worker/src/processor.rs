//! Per-upload scoring pipeline.
//!
//! `Ingesting -> Segmenting (optional) -> Classifying -> Aggregating ->
//! CleaningUp -> Done`. Once ingestion succeeded nothing fails: stage errors
//! degrade to the raw clip or a zero reward, and every temp artifact of the
//! request is removed before the outcome is returned.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures_util::Stream;
use tracing::Instrument;
use vreward_media::{
    ClassificationStage, FfmpegEncoder, FfmpegFrameSource, FrameSampler, FrameSource, ModelRegistry,
    SegmentationStage, TempMediaStore, VideoEncoder,
};
use vreward_models::{BackendKind, ClassificationTarget, PipelineStage, RewardOutcome};

use crate::config::ScoringConfig;
use crate::error::IngestResult;
use crate::ingest::{ingest, IngestLimits, UploadArtifact, UploadRequest};
use crate::logging::EpisodeLogger;
use crate::metrics;

/// Scores uploaded clips. Cheap to clone; share one per process.
#[derive(Clone)]
pub struct RewardProcessor {
    registry: Arc<ModelRegistry>,
    segmentation: SegmentationStage,
    classification: ClassificationStage,
    store: TempMediaStore,
    limits: IngestLimits,
}

impl RewardProcessor {
    /// Processor backed by FFmpeg for decoding and encoding.
    pub fn new(config: &ScoringConfig, registry: Arc<ModelRegistry>) -> Self {
        Self::with_media(
            config,
            registry,
            Arc::new(FfmpegFrameSource::new()),
            Arc::new(FfmpegEncoder::new()),
        )
    }

    /// Processor with explicit media components.
    pub fn with_media(
        config: &ScoringConfig,
        registry: Arc<ModelRegistry>,
        source: Arc<dyn FrameSource>,
        encoder: Arc<dyn VideoEncoder>,
    ) -> Self {
        let store = TempMediaStore::new(config.work_dir.clone());
        let sampler = FrameSampler::new(source);

        Self {
            segmentation: SegmentationStage::new(
                Arc::clone(&registry),
                sampler.clone(),
                encoder,
                store.clone(),
                config.segmentation(),
            ),
            classification: ClassificationStage::new(Arc::clone(&registry), sampler, config.classification()),
            registry,
            store,
            limits: config.ingest_limits(),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &TempMediaStore {
        &self.store
    }

    pub fn limits(&self) -> &IngestLimits {
        &self.limits
    }

    /// Receive an upload into a temp file. The only fallible step.
    pub async fn ingest<S, E>(&self, request: &UploadRequest, body: S) -> IngestResult<UploadArtifact>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let logger = EpisodeLogger::new(request.episode, "ingest");
        logger.log_start(&format!("declared size {} bytes", request.declared_size));

        match ingest(&self.store, &self.limits, request, body).await {
            Ok(upload) => {
                metrics::record_upload_accepted(upload.size);
                logger.log_completion(&format!("{} bytes received", upload.size));
                Ok(upload)
            }
            Err(e) => {
                metrics::record_upload_rejected(e.kind());
                if e.is_client_error() {
                    logger.log_warning(&format!("upload rejected: {}", e));
                } else {
                    logger.log_error(&format!("upload failed: {}", e));
                }
                Err(e)
            }
        }
    }

    /// Score an ingested upload and remove every artifact it produced.
    pub async fn score(&self, upload: UploadArtifact) -> RewardOutcome {
        let logger = EpisodeLogger::new(upload.episode, "reward_scoring");
        let span = logger.create_span();
        self.run_stages(upload, &logger).instrument(span).await
    }

    /// Ingest then score.
    pub async fn process_upload<S, E>(&self, request: &UploadRequest, body: S) -> IngestResult<RewardOutcome>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let upload = self.ingest(request, body).await?;
        Ok(self.score(upload).await)
    }

    async fn run_stages(&self, upload: UploadArtifact, logger: &EpisodeLogger) -> RewardOutcome {
        let UploadArtifact {
            artifact,
            size,
            episode,
            ..
        } = upload;
        let mut stages = vec![PipelineStage::Ingesting];
        let start = Instant::now();

        let segmented = if self.segmentation.is_available() {
            stages.push(PipelineStage::Segmenting);
            logger.log_progress("segmenting upload");
            let segmented = self.segmentation.run(artifact.path()).await;
            if segmented.is_none() {
                metrics::record_segmentation_fallback();
                logger.log_warning("segmentation produced no video; classifying raw clip");
            }
            segmented
        } else {
            logger.log_progress(&format!(
                "{} unavailable; classifying raw clip",
                BackendKind::Segmentation
            ));
            None
        };

        let (target, target_path) = match &segmented {
            Some(seg) => (ClassificationTarget::Segmented, seg.path()),
            None => (ClassificationTarget::Raw, artifact.path()),
        };

        stages.push(PipelineStage::Classifying);
        let report = self.classification.score(target_path).await;

        stages.push(PipelineStage::Aggregating);
        let reward = report.reward.clamp(0.0, 1.0);
        let analysis_time = start.elapsed().as_secs_f64();

        stages.push(PipelineStage::CleaningUp);
        if let Some(seg) = segmented {
            seg.cleanup().await;
        }
        artifact.cleanup().await;
        stages.push(PipelineStage::Done);

        metrics::record_analysis(target, reward, analysis_time);
        match &report.reason {
            Some(reason) => {
                metrics::record_zero_reward();
                logger.log_warning(&format!("reward degraded to {:.4}: {}", reward, reason));
            }
            None => logger.log_completion(&format!(
                "target={} score={:.4} windows={} time={:.2}s",
                target, reward, report.windows_scored, analysis_time
            )),
        }

        RewardOutcome {
            episode,
            reward,
            analysis_time,
            upload_bytes: size,
            target,
            windows_scored: report.windows_scored,
            stages,
            reason: report.reason,
        }
    }
}
