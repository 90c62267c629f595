//! Frame sources: full-clip decoding into RGB frames.

use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, warn};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::frame::{DecodedVideo, Frame, FrameScale};
use crate::probe::probe_video;

/// Decodes a clip into ordered frames.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Decode every frame of `path`, resized per `scale`.
    async fn decode(&self, path: &Path, scale: FrameScale) -> MediaResult<DecodedVideo>;

    fn name(&self) -> &'static str;
}

/// FFmpeg-backed frame source decoding to a raw RGB24 pipe.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameSource;

impl FfmpegFrameSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn decode(&self, path: &Path, scale: FrameScale) -> MediaResult<DecodedVideo> {
        let info = probe_video(path).await?;
        let (width, height) = scale.target_dimensions(info.width, info.height);

        let cmd = FfmpegCommand::decode_rgb(path).video_filter(format!(
            "scale={}:{}:flags={}",
            width,
            height,
            scale.scaler_flags()
        ));

        debug!(
            path = %path.display(),
            width,
            height,
            fps = info.fps,
            "Decoding frames"
        );

        let mut child = cmd.to_command()?.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("Failed to capture FFmpeg stderr", None, None))?;
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let frames = read_frames(BufReader::new(stdout), width, height).await?;
        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).to_string();
            if frames.is_empty() {
                return Err(MediaError::ffmpeg_failed(
                    "Frame decode failed",
                    Some(stderr),
                    status.code(),
                ));
            }
            // Truncated streams still yield the frames decoded so far.
            warn!(
                path = %path.display(),
                frames = frames.len(),
                stderr = %stderr.trim(),
                "FFmpeg exited with errors after partial decode"
            );
        }

        Ok(DecodedVideo {
            frames,
            width,
            height,
            fps: info.fps,
        })
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Read packed RGB24 frames one at a time; a trailing partial frame is dropped.
pub(crate) async fn read_frames<R>(mut reader: R, width: u32, height: u32) -> std::io::Result<Vec<Frame>>
where
    R: AsyncRead + Unpin,
{
    let frame_len = width as usize * height as usize * 3;
    let mut frames = Vec::new();
    if frame_len == 0 {
        return Ok(frames);
    }

    loop {
        let mut buf = vec![0u8; frame_len];
        match reader.read_exact(&mut buf).await {
            Ok(_) => frames.extend(Frame::from_raw(width, height, buf)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(frames),
            Err(e) => return Err(e),
        }
    }
}
