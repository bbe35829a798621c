use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A normalized rectangle (0.0 to 1.0) representing a relative region of an image.
///
/// Face detectors report boxes in this form; values slightly outside the
/// unit range are tolerated and clamped when converted to pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NormalizedRect {
    /// X coordinate of the top-left corner (0.0 = left, 1.0 = right)
    pub x: f64,
    /// Y coordinate of the top-left corner (0.0 = top, 1.0 = bottom)
    pub y: f64,
    /// Width of the rectangle (0.0 to 1.0)
    pub width: f64,
    /// Height of the rectangle (0.0 to 1.0)
    pub height: f64,
}

impl NormalizedRect {
    /// Create a new normalized rectangle.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Finite components and a positive extent.
    ///
    /// Boxes reaching past the image edge still count; they are clamped
    /// once converted to pixels.
    pub fn is_usable(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Convert to absolute pixel coordinates of an image of the given size.
    ///
    /// Each component is truncated toward zero independently, the same way
    /// the detection boxes are scored. The result is not clamped.
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> (i64, i64, i64, i64) {
        let w = f64::from(image_width);
        let h = f64::from(image_height);
        (
            (self.x * w) as i64,
            (self.y * h) as i64,
            (self.width * w) as i64,
            (self.height * h) as i64,
        )
    }
}

/// A rectangle in absolute pixel coordinates of a target image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// True when the rectangle lies entirely inside a `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_pixels_truncates() {
        let rect = NormalizedRect::new(0.1255, 0.25, 0.375, 0.5);
        assert_eq!(rect.to_pixels(1000, 800), (125, 200, 375, 400));
    }

    #[test]
    fn test_usable_boxes() {
        assert!(NormalizedRect::new(0.1, 0.1, 0.5, 0.5).is_usable());
        // Overhanging boxes are kept for clamping
        assert!(NormalizedRect::new(-0.1, 0.6, 0.5, 0.5).is_usable());
        assert!(!NormalizedRect::new(0.1, 0.1, 0.0, 0.5).is_usable());
        assert!(!NormalizedRect::new(f64::NAN, 0.1, 0.5, 0.5).is_usable());
        assert!(!NormalizedRect::new(0.1, 0.1, f64::INFINITY, 0.5).is_usable());
    }

    #[test]
    fn test_pixel_rect_bounds() {
        let rect = PixelRect::new(150, 160, 250, 500);
        assert!(rect.fits_within(1000, 800));
        assert!(!rect.fits_within(1000, 600));
    }
}
