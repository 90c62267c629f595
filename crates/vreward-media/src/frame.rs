//! Decoded frame types and spatial policy.

/// A decoded RGB frame.
pub type Frame = image::RgbImage;

/// How decoded frames are sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameScale {
    /// Resize every frame to exactly these dimensions.
    Exact { width: u32, height: u32 },
    /// Downscale uniformly so the width is at most this value; never upscale.
    MaxWidth(u32),
}

impl FrameScale {
    pub fn square(size: u32) -> Self {
        FrameScale::Exact {
            width: size,
            height: size,
        }
    }

    /// Target dimensions for a source of the given size.
    pub fn target_dimensions(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        match *self {
            FrameScale::Exact { width, height } => (width.max(1), height.max(1)),
            FrameScale::MaxWidth(max_width) => downscale_dimensions(src_width, src_height, max_width),
        }
    }

    /// FFmpeg interpolation flag matching the resize direction.
    pub(crate) fn scaler_flags(&self) -> &'static str {
        match self {
            FrameScale::Exact { .. } => "bilinear",
            FrameScale::MaxWidth(_) => "area",
        }
    }
}

/// Dimensions after uniformly downscaling to `max_width`.
///
/// The factor is `max_width / src_width` when the source is wider, 1 otherwise;
/// each side is `max(floor(side * factor), 1)`.
pub fn downscale_dimensions(src_width: u32, src_height: u32, max_width: u32) -> (u32, u32) {
    let src_width = src_width.max(1);
    let src_height = src_height.max(1);
    if max_width == 0 || src_width <= max_width {
        return (src_width, src_height);
    }

    // floor(side * max_width / src_width) in integer arithmetic.
    let height = (src_height as u64 * max_width as u64 / src_width as u64) as u32;
    (max_width, height.max(1))
}

/// All frames of a clip, materialized at the target resolution.
#[derive(Debug, Clone)]
pub struct DecodedVideo {
    pub frames: Vec<Frame>,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl DecodedVideo {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }
}
