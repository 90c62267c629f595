//! Scoring pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use vreward_media::{ClassificationConfig, SegmentationConfig, WindowConfig};

use crate::ingest::IngestLimits;

/// Pipeline configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Frames per classification window
    pub frame_count: usize,
    /// Classification windows per clip
    pub window_count: usize,
    /// Square side of classification frames
    pub frame_size: u32,
    /// Label whose probability is the reward
    pub positive_label: String,
    /// Whether the segmentation stage runs at all
    pub segmentation_enabled: bool,
    /// Frames wider than this are downscaled for segmentation
    pub segment_max_width: u32,
    /// Mask area fraction treated as background
    pub background_ratio: f64,
    /// Maximum upload size in bytes
    pub max_upload_bytes: u64,
    /// Maximum wait for one upload chunk
    pub chunk_timeout: Duration,
    /// Read size used when streaming uploads to disk
    pub chunk_size: usize,
    /// Directory for temp media files
    pub work_dir: PathBuf,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            frame_count: 16,
            window_count: 4,
            frame_size: 224,
            positive_label: "real".to_string(),
            segmentation_enabled: true,
            segment_max_width: 640,
            background_ratio: 0.2,
            max_upload_bytes: 100 * 1024 * 1024, // 100 MiB
            chunk_timeout: Duration::from_secs(10),
            chunk_size: 1024 * 1024, // 1 MiB
            work_dir: std::env::temp_dir(),
        }
    }
}

impl ScoringConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            frame_count: env_parse("VIDEO_CLASS_FRAME_COUNT", defaults.frame_count).max(1),
            window_count: env_parse("VIDEO_CLASS_WINDOW_COUNT", defaults.window_count).max(1),
            frame_size: defaults.frame_size,
            positive_label: std::env::var("VIDEO_CLASS_POSITIVE_LABEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.positive_label),
            segmentation_enabled: std::env::var("SEGMENTATION_ENABLED")
                .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off"))
                .unwrap_or(defaults.segmentation_enabled),
            segment_max_width: env_parse("SEGMENT_MAX_WIDTH", defaults.segment_max_width),
            background_ratio: env_parse("SEGMENT_BACKGROUND_RATIO", defaults.background_ratio),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            chunk_timeout: Duration::from_secs(env_parse(
                "UPLOAD_CHUNK_TIMEOUT_SECS",
                defaults.chunk_timeout.as_secs(),
            )),
            chunk_size: env_parse("UPLOAD_CHUNK_SIZE", defaults.chunk_size).max(1),
            work_dir: std::env::var("REWARD_WORK_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
        }
    }

    pub fn ingest_limits(&self) -> IngestLimits {
        IngestLimits {
            max_bytes: self.max_upload_bytes,
            chunk_timeout: self.chunk_timeout,
            buffer_size: self.chunk_size,
        }
    }

    pub fn segmentation(&self) -> SegmentationConfig {
        SegmentationConfig {
            enabled: self.segmentation_enabled,
            max_width: self.segment_max_width,
            background_ratio: self.background_ratio,
            ..SegmentationConfig::default()
        }
    }

    pub fn classification(&self) -> ClassificationConfig {
        ClassificationConfig {
            windows: WindowConfig {
                frame_count: self.frame_count,
                window_count: self.window_count,
                frame_size: self.frame_size,
            },
            positive_label: self.positive_label.clone(),
        }
    }

    /// Maximum upload size in whole megabytes, for display.
    pub fn max_upload_mb(&self) -> f64 {
        self.max_upload_bytes as f64 / (1024.0 * 1024.0)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScoringConfig::default();
        assert_eq!(config.frame_count, 16);
        assert_eq!(config.window_count, 4);
        assert_eq!(config.max_upload_bytes, 104_857_600);
        assert_eq!(config.chunk_timeout, Duration::from_secs(10));
        assert_eq!(config.max_upload_mb(), 100.0);

        let seg = config.segmentation();
        assert_eq!(seg.max_width, 640);
        assert_eq!(seg.highlight_color, [0, 255, 0]);
        assert_eq!(config.classification().positive_label, "real");
    }
}
