//! Frame sampling: fail-soft decoding and fixed-length window selection.

use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::decode::FrameSource;
use crate::frame::{DecodedVideo, Frame, FrameScale};

/// Window selection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Frames per window
    pub frame_count: usize,
    /// Windows per clip
    pub window_count: usize,
    /// Square side classification frames are resized to
    pub frame_size: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            frame_count: 16,
            window_count: 4,
            frame_size: 224,
        }
    }
}

/// Start indices of the windows over a clip of `total` frames.
///
/// `total` here is the padded length, i.e. at least `frame_count`.
pub fn window_starts(total: usize, frame_count: usize, window_count: usize) -> Vec<usize> {
    if window_count <= 1 || total <= frame_count {
        return vec![0];
    }

    let max_start = total - frame_count;
    let last = (window_count - 1) as f64;
    (0..window_count)
        .map(|i| ((i * max_start) as f64 / last).round_ties_even() as usize)
        .collect()
}

/// Cut `frames` into `window_count` windows of exactly `frame_count` frames.
///
/// Short clips are padded by repeating the last frame; empty input yields
/// no windows.
pub fn sample_windows<T: Clone>(
    frames: &[T],
    frame_count: usize,
    window_count: usize,
) -> Vec<Vec<T>> {
    let Some(last) = frames.len().checked_sub(1) else {
        return Vec::new();
    };
    if frame_count == 0 {
        return Vec::new();
    }

    // Index past the end maps to the last frame, which covers both padding rules.
    let padded_len = frames.len().max(frame_count);
    window_starts(padded_len, frame_count, window_count)
        .into_iter()
        .map(|start| {
            (start..start + frame_count)
                .map(|idx| frames[idx.min(last)].clone())
                .collect()
        })
        .collect()
}

/// Decodes clips and produces classification windows; never fails.
#[derive(Clone)]
pub struct FrameSampler {
    source: Arc<dyn FrameSource>,
}

impl FrameSampler {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self { source }
    }

    /// Decode a clip, returning `None` (logged) if it cannot be opened.
    pub async fn decode_video(&self, path: &Path, scale: FrameScale) -> Option<DecodedVideo> {
        match self.source.decode(path, scale).await {
            Ok(video) => Some(video),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    source = self.source.name(),
                    error = %e,
                    "Unable to decode video"
                );
                None
            }
        }
    }

    /// All frames of a clip, empty if it cannot be decoded.
    pub async fn decode(&self, path: &Path, scale: FrameScale) -> Vec<Frame> {
        self.decode_video(path, scale)
            .await
            .map(|video| video.frames)
            .unwrap_or_default()
    }

    /// Classification windows of a clip, square-resized per `config`.
    pub async fn windows(&self, path: &Path, config: &WindowConfig) -> Vec<Vec<Frame>> {
        let frames = self
            .decode(path, FrameScale::square(config.frame_size))
            .await;
        sample_windows(&frames, config.frame_count, config.window_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_clip_padded_with_last_frame() {
        let frames: Vec<u32> = (0..5).collect();
        let windows = sample_windows(&frames, 16, 4);

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].len(), 16);
        assert_eq!(&windows[0][..5], &[0, 1, 2, 3, 4]);
        assert!(windows[0][5..].iter().all(|&f| f == 4));
    }

    #[test]
    fn test_exact_length_single_window() {
        let frames: Vec<u32> = (0..16).collect();
        let windows = sample_windows(&frames, 16, 4);
        assert_eq!(windows, vec![frames.clone()]);
    }

    #[test]
    fn test_windows_evenly_spaced() {
        let frames: Vec<u32> = (0..100).collect();
        let windows = sample_windows(&frames, 16, 4);

        assert_eq!(windows.len(), 4);
        let starts: Vec<u32> = windows.iter().map(|w| w[0]).collect();
        assert_eq!(starts, vec![0, 28, 56, 84]);
        for window in &windows {
            assert_eq!(window.len(), 16);
            assert!(window.windows(2).all(|p| p[1] == p[0] + 1));
        }
    }

    #[test]
    fn test_starts_round_half_to_even() {
        // max_start = 3, spacing 1.5 -> 0, 1.5, 3 -> 0, 2, 3
        assert_eq!(window_starts(19, 16, 3), vec![0, 2, 3]);
        // max_start = 1, spacing 0.5 -> 0, 0.5, 1 -> 0, 0, 1
        assert_eq!(window_starts(17, 16, 3), vec![0, 0, 1]);
    }

    #[test]
    fn test_single_window_requested() {
        assert_eq!(window_starts(100, 16, 1), vec![0]);
        assert_eq!(window_starts(100, 16, 0), vec![0]);
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let frames: Vec<u32> = Vec::new();
        assert!(sample_windows(&frames, 16, 4).is_empty());
        assert!(sample_windows(&[1u32, 2], 0, 4).is_empty());
    }
}
