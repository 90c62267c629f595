//! Video encoders for rendered frame sequences.

use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Writes frames to a video container.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Encode `frames` at `fps` into `output`. All frames share one resolution.
    async fn encode(&self, frames: &[Frame], fps: f64, output: &Path) -> MediaResult<()>;

    fn name(&self) -> &'static str;
}

/// FFmpeg encoder fed with raw RGB24 frames over stdin.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    codec: String,
    /// Codec quality scale (`-q:v`), lower is better
    quality: u8,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self {
            codec: "mpeg4".to_string(),
            quality: 5,
        }
    }
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(&self, output: &Path, width: u32, height: u32, fps: f64) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::encode_rgb(output, width, height, fps)
            .video_codec(&self.codec)
            .output_args(["-q:v".to_string(), self.quality.to_string()])
            .output_args(["-pix_fmt", "yuv420p"]);

        // 4:2:0 chroma needs even dimensions; pad with black on the far edges.
        if width % 2 == 1 || height % 2 == 1 {
            cmd = cmd.video_filter("pad=ceil(iw/2)*2:ceil(ih/2)*2");
        }
        cmd
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(&self, frames: &[Frame], fps: f64, output: &Path) -> MediaResult<()> {
        let first = frames
            .first()
            .ok_or_else(|| MediaError::InvalidVideo("No frames to encode".to_string()))?;
        let (width, height) = first.dimensions();
        if frames.iter().any(|f| f.dimensions() != (width, height)) {
            return Err(MediaError::InvalidVideo(
                "Frames have mixed resolutions".to_string(),
            ));
        }

        let cmd = self.command(output, width, height, fps);
        debug!(
            output = %output.display(),
            frames = frames.len(),
            width,
            height,
            fps,
            "Encoding video"
        );

        let mut child = cmd.to_command()?.spawn()?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdin not captured"))?;

        for frame in frames {
            if let Err(e) = stdin.write_all(frame.as_raw()).await {
                // Broken pipe: ffmpeg died early, its stderr says why.
                drop(stdin);
                let out = child.wait_with_output().await?;
                return Err(MediaError::ffmpeg_failed(
                    format!("Encoder stopped accepting frames: {}", e),
                    Some(String::from_utf8_lossy(&out.stderr).to_string()),
                    out.status.code(),
                ));
            }
        }
        stdin.shutdown().await?;
        drop(stdin);

        let out = child.wait_with_output().await?;
        if !out.status.success() {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(String::from_utf8_lossy(&out.stderr).to_string()),
                out.status.code(),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odd_dimensions_are_padded() {
        let args = FfmpegEncoder::new()
            .command(Path::new("out.mp4"), 321, 240, 30.0)
            .build_args();
        assert!(args.iter().any(|a| a.starts_with("pad=")));

        let args = FfmpegEncoder::new()
            .command(Path::new("out.mp4"), 320, 240, 30.0)
            .build_args();
        assert!(!args.iter().any(|a| a.starts_with("pad=")));
        assert!(args.contains(&"mpeg4".to_string()));
    }

    #[tokio::test]
    async fn test_empty_frames_rejected() {
        let err = FfmpegEncoder::new()
            .encode(&[], 30.0, Path::new("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidVideo(_)));
    }
}
