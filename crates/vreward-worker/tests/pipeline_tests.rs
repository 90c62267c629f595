//! End-to-end pipeline tests against the deterministic media fakes.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use vreward_media::testing::{
    fake_registry, ClassifierBehavior, FakeClassifierLoader, FakeSegmentationLoader, RecordingEncoder,
    SegmentationBehavior, SyntheticFrameSource,
};
use vreward_media::TempMediaStore;
use vreward_models::{BackendKind, ClassificationTarget, EpisodeKey, PipelineStage};
use vreward_worker::{IngestError, RewardProcessor, ScoringConfig, UploadRequest};

/// Logits giving P(real) = 0.75.
fn three_to_one() -> Vec<f32> {
    vec![0.0, 3.0f32.ln()]
}

struct Harness {
    _dir: TempDir,
    config: ScoringConfig,
    source: Arc<SyntheticFrameSource>,
    encoder: Arc<RecordingEncoder>,
    processor: RewardProcessor,
}

impl Harness {
    fn new(seg: FakeSegmentationLoader, cls: FakeClassifierLoader) -> Self {
        Self::with_config(seg, cls, |_| {})
    }

    fn with_config(
        seg: FakeSegmentationLoader,
        cls: FakeClassifierLoader,
        tweak: impl FnOnce(&mut ScoringConfig),
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = ScoringConfig {
            work_dir: dir.path().join("work"),
            ..ScoringConfig::default()
        };
        tweak(&mut config);

        let source = Arc::new(SyntheticFrameSource::new(10, 320, 240));
        let encoder = Arc::new(RecordingEncoder::new());
        let processor = RewardProcessor::with_media(
            &config,
            fake_registry(seg, cls),
            source.clone(),
            encoder.clone(),
        );

        Self {
            _dir: dir,
            config,
            source,
            encoder,
            processor,
        }
    }

    fn store(&self) -> TempMediaStore {
        TempMediaStore::new(self.config.work_dir.clone())
    }

    fn leftover_files(&self) -> usize {
        self.store().list().unwrap().len()
    }
}

fn body(parts: Vec<&'static [u8]>) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
    stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
}

fn request(episode: i64) -> UploadRequest {
    UploadRequest::new(EpisodeKey::new(episode, 1))
        .with_content_type("video/mp4")
        .with_filename("episode.mp4")
}

#[tokio::test]
async fn test_static_scene_scores_blank_segmented_video() {
    let h = Harness::new(
        FakeSegmentationLoader::with_behavior(SegmentationBehavior::StaticScene),
        FakeClassifierLoader::new(three_to_one()),
    );

    let outcome = assert_ok!(h.processor.process_upload(&request(1), body(vec![b"fake mp4"])).await);

    assert!(outcome.reward.is_finite());
    assert!((0.0..=1.0).contains(&outcome.reward));
    assert!((outcome.reward - 0.75).abs() < 1e-6);
    assert_eq!(outcome.target, ClassificationTarget::Segmented);
    assert_eq!(outcome.upload_bytes, 8);
    assert!(outcome.reason.is_none());
    assert_eq!(
        outcome.stages,
        vec![
            PipelineStage::Ingesting,
            PipelineStage::Segmenting,
            PipelineStage::Classifying,
            PipelineStage::Aggregating,
            PipelineStage::CleaningUp,
            PipelineStage::Done,
        ]
    );

    let clips = h.encoder.clips();
    assert_eq!(clips.len(), 1);
    assert_eq!((clips[0].frames, clips[0].width, clips[0].height), (10, 320, 240));
    assert_eq!(clips[0].lit_pixels, 0);

    // Classification read the segmented artifact, not the upload.
    let decoded = h.source.decoded_paths();
    assert_eq!(decoded.len(), 2);
    assert!(decoded[1].to_string_lossy().ends_with("_segmented.mp4"));

    assert_eq!(h.leftover_files(), 0);
}

#[tokio::test]
async fn test_segmentation_failure_classifies_raw_clip() {
    for behavior in [
        SegmentationBehavior::NoMasks,
        SegmentationBehavior::Fail,
        SegmentationBehavior::Panic,
    ] {
        let h = Harness::new(
            FakeSegmentationLoader::with_behavior(behavior),
            FakeClassifierLoader::new(three_to_one()),
        );

        let outcome = assert_ok!(h.processor.process_upload(&request(2), body(vec![b"clip"])).await);

        assert_eq!(outcome.target, ClassificationTarget::Raw, "{:?}", behavior);
        assert!((outcome.reward - 0.75).abs() < 1e-6, "{:?}", behavior);
        assert!(outcome.stages.contains(&PipelineStage::Segmenting));

        let decoded = h.source.decoded_paths();
        assert_eq!(decoded[0], decoded[1], "{:?}", behavior);
        assert_eq!(h.leftover_files(), 0, "{:?}", behavior);
    }
}

#[tokio::test]
async fn test_unavailable_segmentation_is_skipped() {
    let h = Harness::new(
        FakeSegmentationLoader::unavailable(),
        FakeClassifierLoader::new(three_to_one()),
    );

    let outcome = assert_ok!(h.processor.process_upload(&request(3), body(vec![b"clip"])).await);

    assert_eq!(outcome.target, ClassificationTarget::Raw);
    assert!(!outcome.stages.contains(&PipelineStage::Segmenting));
    assert!(outcome.is_scored());
    assert!(h.encoder.clips().is_empty());
}

#[tokio::test]
async fn test_segmentation_kill_switch() {
    let seg = FakeSegmentationLoader::new();
    let loads = seg.load_counter();
    let h = Harness::with_config(seg, FakeClassifierLoader::new(three_to_one()), |c| {
        c.segmentation_enabled = false;
    });

    let outcome = assert_ok!(h.processor.process_upload(&request(4), body(vec![b"clip"])).await);

    assert_eq!(outcome.target, ClassificationTarget::Raw);
    assert_eq!(loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_classifier_failures_score_zero_and_clean_up() {
    let cases = [
        FakeClassifierLoader::unavailable(),
        FakeClassifierLoader::new(three_to_one()).with_behavior(ClassifierBehavior::Fail),
        FakeClassifierLoader::new(three_to_one()).with_behavior(ClassifierBehavior::Panic),
    ];

    for cls in cases {
        let h = Harness::new(FakeSegmentationLoader::new(), cls);
        let outcome = assert_ok!(h.processor.process_upload(&request(5), body(vec![b"clip"])).await);

        assert_eq!(outcome.reward, 0.0);
        assert_eq!(outcome.windows_scored, 0);
        assert!(outcome.reason.is_some());
        assert_eq!(outcome.stages.last(), Some(&PipelineStage::Done));
        assert_eq!(h.leftover_files(), 0);
    }
}

#[tokio::test]
async fn test_declared_oversize_rejected_before_temp_file() {
    let h = Harness::with_config(
        FakeSegmentationLoader::new(),
        FakeClassifierLoader::new(three_to_one()),
        |c| c.max_upload_bytes = 16,
    );
    let request = request(6).with_declared_size(17);

    let err = assert_err!(h.processor.process_upload(&request, body(vec![b"x"])).await);

    assert!(matches!(err, IngestError::Oversize { size: 17, max: 16 }));
    assert!(!h.config.work_dir.exists());
    assert!(h.source.decoded_paths().is_empty());
}

#[tokio::test]
async fn test_midstream_oversize_rejected_and_removed() {
    let h = Harness::with_config(
        FakeSegmentationLoader::new(),
        FakeClassifierLoader::new(three_to_one()),
        |c| c.max_upload_bytes = 16,
    );

    let err = assert_err!(
        h.processor
            .process_upload(&request(7), body(vec![b"0123456789", b"0123456789"]))
            .await
    );

    assert!(matches!(err, IngestError::Oversize { size: 20, max: 16 }));
    assert_eq!(h.leftover_files(), 0);
    assert!(h.source.decoded_paths().is_empty());
}

#[tokio::test]
async fn test_non_video_content_type_rejected() {
    let h = Harness::new(FakeSegmentationLoader::new(), FakeClassifierLoader::new(three_to_one()));
    let request = UploadRequest::new(EpisodeKey::new(8, 1)).with_content_type("text/plain");

    let err = assert_err!(h.processor.process_upload(&request, body(vec![b"hello"])).await);

    assert!(matches!(err, IngestError::InvalidContentType(_)));
    assert!(!h.config.work_dir.exists());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_upload_times_out() {
    let h = Harness::new(FakeSegmentationLoader::new(), FakeClassifierLoader::new(three_to_one()));
    let stalled = body(vec![b"first chunk"]).chain(stream::pending());

    let err = assert_err!(h.processor.process_upload(&request(9), stalled).await);

    assert!(matches!(err, IngestError::ChunkTimeout(d) if d == Duration::from_secs(10)));
    assert_eq!(h.leftover_files(), 0);
}

#[tokio::test]
async fn test_concurrent_uploads_share_one_model_per_backend() {
    let seg = FakeSegmentationLoader::new();
    let cls = FakeClassifierLoader::new(three_to_one()).with_load_delay(Duration::from_millis(20));
    let (seg_loads, cls_loads) = (seg.load_counter(), cls.load_counter());
    let h = Harness::new(seg, cls);

    let uploads = (0..6).map(|i| {
        let processor = h.processor.clone();
        tokio::spawn(async move { processor.process_upload(&request(100 + i), body(vec![b"clip"])).await })
    });
    for handle in futures_util::future::join_all(uploads).await {
        let outcome = assert_ok!(handle.unwrap());
        assert!((outcome.reward - 0.75).abs() < 1e-6);
    }

    assert_eq!(seg_loads.load(Ordering::SeqCst), 1);
    assert_eq!(cls_loads.load(Ordering::SeqCst), 1);
    assert_eq!(h.processor.registry().initializations(BackendKind::Classification), 1);
    assert_eq!(h.leftover_files(), 0);
}

#[tokio::test]
async fn test_cancelled_upload_removes_artifacts() {
    let cls = FakeClassifierLoader::new(three_to_one())
        .with_behavior(ClassifierBehavior::Stall(Duration::from_millis(100)));
    let calls = cls.call_counter();
    let h = Harness::new(FakeSegmentationLoader::new(), cls);

    let processor = h.processor.clone();
    let task =
        tokio::spawn(async move { processor.process_upload(&request(11), body(vec![b"fake mp4"])).await });

    // Wait until classification is running on the segmented artifact.
    while calls.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.leftover_files(), 2);

    task.abort();
    let err = task.await.unwrap_err();
    assert!(err.is_cancelled());

    assert_eq!(h.encoder.clips().len(), 1);
    assert_eq!(h.leftover_files(), 0);
}
