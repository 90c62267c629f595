//! Binary masks, point prompts and per-frame mask sets.

use std::collections::BTreeMap;

/// Object identifier, stable across the frames of one tracking session.
pub type ObjectId = u32;

/// Per frame: object id to its mask.
pub type MaskSet = BTreeMap<ObjectId, BinaryMask>;

/// Boolean pixel mask in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl BinaryMask {
    /// An all-false mask.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; width as usize * height as usize],
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Threshold mask logits (row-major, `width * height`) at `threshold`.
    pub fn from_logits(width: u32, height: u32, logits: &[f32], threshold: f32) -> Option<Self> {
        if logits.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            data: logits.iter().map(|&v| v > threshold).collect(),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.data[(y * self.width + x) as usize]
    }

    /// Number of set pixels.
    pub fn area(&self) -> u64 {
        self.data.iter().filter(|&&v| v).count() as u64
    }

    /// Mean (x, y) of set pixels, `None` for an empty mask.
    pub fn centroid(&self) -> Option<(f32, f32)> {
        let (mut sx, mut sy, mut n) = (0f64, 0f64, 0u64);
        for (idx, _) in self.data.iter().enumerate().filter(|(_, &v)| v) {
            sx += (idx as u64 % self.width as u64) as f64;
            sy += (idx as u64 / self.width as u64) as f64;
            n += 1;
        }
        (n > 0).then(|| ((sx / n as f64) as f32, (sy / n as f64) as f32))
    }

    /// Intersection over union with a mask of the same size.
    pub fn iou(&self, other: &BinaryMask) -> f32 {
        if self.dimensions() != other.dimensions() {
            return 0.0;
        }
        let (mut inter, mut union) = (0u64, 0u64);
        for (&a, &b) in self.data.iter().zip(&other.data) {
            inter += (a && b) as u64;
            union += (a || b) as u64;
        }
        if union == 0 {
            0.0
        } else {
            inter as f32 / union as f32
        }
    }

    pub(crate) fn as_slice(&self) -> &[bool] {
        &self.data
    }
}

/// One mask from automatic proposal on a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedMask {
    pub mask: BinaryMask,
    pub predicted_iou: f32,
    pub stability_score: f32,
}

impl ProposedMask {
    pub fn new(mask: BinaryMask) -> Self {
        Self {
            mask,
            predicted_iou: 1.0,
            stability_score: 1.0,
        }
    }

    pub fn area(&self) -> u64 {
        self.mask.area()
    }
}

/// A point prompt registering an object at one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPrompt {
    pub object_id: ObjectId,
    pub frame_index: usize,
    pub x: f32,
    pub y: f32,
    /// Foreground (true) or background (false) click
    pub positive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> BinaryMask {
        BinaryMask::from_fn(width, height, |x, y| x >= x0 && x < x1 && y >= y0 && y < y1)
    }

    #[test]
    fn test_area_and_centroid() {
        let mask = rect(10, 10, 2, 4, 6, 8);
        assert_eq!(mask.area(), 16);
        let (cx, cy) = mask.centroid().unwrap();
        assert!((cx - 3.5).abs() < 1e-5);
        assert!((cy - 5.5).abs() < 1e-5);
        assert!(BinaryMask::empty(4, 4).centroid().is_none());
    }

    #[test]
    fn test_iou() {
        let a = rect(10, 10, 0, 0, 4, 4);
        let b = rect(10, 10, 2, 0, 6, 4);
        assert!((a.iou(&b) - 8.0 / 24.0).abs() < 1e-6);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&BinaryMask::empty(5, 5)), 0.0);
    }

    #[test]
    fn test_from_logits_thresholds_strictly() {
        let mask = BinaryMask::from_logits(2, 2, &[-1.0, 0.0, 0.5, 3.0], 0.0).unwrap();
        assert_eq!(mask.area(), 2);
        assert!(!mask.get(1, 0));
        assert!(mask.get(0, 1));
        assert!(BinaryMask::from_logits(3, 3, &[0.0; 4], 0.0).is_none());
    }
}
