//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder. Without a recorder these calls are no-ops.

use metrics::{counter, histogram};
use vreward_models::ClassificationTarget;

/// Metric names as constants for consistency.
pub mod names {
    pub const UPLOADS_TOTAL: &str = "vreward_uploads_total";
    pub const UPLOAD_BYTES: &str = "vreward_upload_bytes";
    pub const REWARD_VALUE: &str = "vreward_reward_value";
    pub const ANALYSIS_DURATION_SECONDS: &str = "vreward_analysis_duration_seconds";
    pub const SEGMENTATION_FALLBACKS_TOTAL: &str = "vreward_segmentation_fallbacks_total";
    pub const ZERO_REWARDS_TOTAL: &str = "vreward_zero_rewards_total";
}

/// Record an upload that was rejected during ingestion.
pub fn record_upload_rejected(kind: &str) {
    let labels = [("outcome", kind.to_string())];
    counter!(names::UPLOADS_TOTAL, &labels).increment(1);
}

/// Record an upload that was received in full.
pub fn record_upload_accepted(size: u64) {
    let labels = [("outcome", "accepted".to_string())];
    counter!(names::UPLOADS_TOTAL, &labels).increment(1);
    histogram!(names::UPLOAD_BYTES).record(size as f64);
}

/// Record a finished analysis.
pub fn record_analysis(target: ClassificationTarget, reward: f64, duration_secs: f64) {
    let labels = [("target", target.as_str().to_string())];
    histogram!(names::REWARD_VALUE, &labels).record(reward);
    histogram!(names::ANALYSIS_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record that the raw clip was classified because segmentation produced nothing.
pub fn record_segmentation_fallback() {
    counter!(names::SEGMENTATION_FALLBACKS_TOTAL).increment(1);
}

/// Record a neutral reward caused by a pipeline failure.
pub fn record_zero_reward() {
    counter!(names::ZERO_REWARDS_TOTAL).increment(1);
}
