//! FFmpeg command builder for raw RGB frame pipes.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// One side of an FFmpeg invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// A container file on disk.
    File(PathBuf),
    /// Raw packed RGB24 frames over stdin/stdout.
    RawPipe,
}

impl Endpoint {
    fn as_arg(&self) -> String {
        match self {
            Endpoint::File(path) => path.to_string_lossy().to_string(),
            Endpoint::RawPipe => "pipe:".to_string(),
        }
    }

    fn is_pipe(&self) -> bool {
        matches!(self, Endpoint::RawPipe)
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: Endpoint,
    output: Endpoint,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: Endpoint, output: Endpoint) -> Self {
        Self {
            input,
            output,
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    /// Decode a container file into packed RGB24 frames on stdout.
    pub fn decode_rgb(input: impl AsRef<Path>) -> Self {
        Self::new(Endpoint::File(input.as_ref().to_path_buf()), Endpoint::RawPipe)
            .output_args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24"])
    }

    /// Encode packed RGB24 frames read from stdin into a container file.
    pub fn encode_rgb(output: impl AsRef<Path>, width: u32, height: u32, fps: f64) -> Self {
        Self::new(Endpoint::RawPipe, Endpoint::File(output.as_ref().to_path_buf())).input_args([
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-s".to_string(),
            format!("{}x{}", width, height),
            "-r".to_string(),
            format!("{:.3}", fps),
        ])
    }

    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if matches!(self.output, Endpoint::File(_)) {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-v".to_string());
        args.push("error".to_string());

        args.extend(self.input_args.clone());
        args.push("-i".to_string());
        args.push(self.input.as_arg());

        args.extend(self.output_args.clone());
        args.push(self.output.as_arg());

        args
    }

    /// Prepare a `tokio` process with pipes wired for the endpoints.
    pub fn to_command(&self) -> MediaResult<Command> {
        check_ffmpeg()?;

        let mut command = Command::new("ffmpeg");
        command
            .args(self.build_args())
            .stdin(if self.input.is_pipe() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(if self.output.is_pipe() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(command)
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_args() {
        let args = FfmpegCommand::decode_rgb("clip.mp4")
            .video_filter("scale=224:224")
            .build_args();

        assert!(!args.contains(&"-y".to_string()));
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "clip.mp4");
        assert!(args.contains(&"rgb24".to_string()));
        assert!(args.contains(&"scale=224:224".to_string()));
        assert_eq!(args.last().unwrap(), "pipe:");
    }

    #[test]
    fn test_encode_args() {
        let args = FfmpegCommand::encode_rgb("out.mp4", 320, 240, 30.0)
            .video_codec("mpeg4")
            .build_args();

        assert_eq!(args[0], "-y");
        let size = args.iter().position(|a| a == "-s").unwrap();
        assert_eq!(args[size + 1], "320x240");
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "pipe:");
        // Input options precede -i, codec follows it.
        assert!(size < input);
        assert!(args.iter().position(|a| a == "-c:v").unwrap() > input);
        assert_eq!(args.last().unwrap(), "out.mp4");
    }
}
