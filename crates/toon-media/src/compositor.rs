//! Feathered compositing of the stylized image onto a template.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbaImage};
use toon_models::PixelRect;

use crate::error::{MediaError, MediaResult};
use crate::placement::Placement;

/// Gaussian sigma, in pixels, applied to the mask edge.
pub const DEFAULT_FEATHER_RADIUS: f32 = 8.0;

/// Build a `width` x `height` mask that is opaque inside the inscribed
/// ellipse and transparent outside, with the edge blurred by `radius`.
///
/// A radius of zero (or less) leaves a hard edge.
pub fn feather_mask(width: u32, height: u32, radius: f32) -> GrayImage {
    let rx = width as f32 / 2.0;
    let ry = height as f32 / 2.0;

    let hard = GrayImage::from_fn(width, height, |x, y| {
        let nx = (x as f32 + 0.5 - rx) / rx;
        let ny = (y as f32 + 0.5 - ry) / ry;
        if nx * nx + ny * ny <= 1.0 {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    if radius > 0.0 {
        imageops::blur(&hard, radius)
    } else {
        hard
    }
}

/// Blends a source image into a template with a soft elliptical mask.
#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    feather_radius: f32,
}

impl Default for Compositor {
    fn default() -> Self {
        Self {
            feather_radius: DEFAULT_FEATHER_RADIUS,
        }
    }
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mask blur radius (0 = hard edge).
    pub fn with_feather_radius(mut self, radius: f32) -> Self {
        self.feather_radius = radius.max(0.0);
        self
    }

    pub fn feather_radius(&self) -> f32 {
        self.feather_radius
    }

    /// Resize `source` per `placement`, mask it and paste it over a copy
    /// of `target`. `target` itself is never modified.
    pub fn composite(
        &self,
        source: &RgbaImage,
        target: &RgbaImage,
        rect: &PixelRect,
        placement: &Placement,
    ) -> MediaResult<RgbaImage> {
        if source.width() == 0 || source.height() == 0 {
            return Err(MediaError::composite_failed("source image is empty"));
        }
        if !rect.fits_within(target.width(), target.height()) {
            return Err(MediaError::composite_failed(format!(
                "region {:?} exceeds template bounds {}x{}",
                rect,
                target.width(),
                target.height()
            )));
        }
        if placement.width == 0 || placement.height == 0 {
            return Err(MediaError::composite_failed(format!(
                "placement has zero size ({}x{})",
                placement.width, placement.height
            )));
        }

        let mut resized = imageops::resize(source, placement.width, placement.height, FilterType::Lanczos3);
        let mask = feather_mask(placement.width, placement.height, self.feather_radius);
        apply_mask(&mut resized, &mask);

        let mut out = target.clone();
        imageops::overlay(&mut out, &resized, placement.offset_x, placement.offset_y);
        Ok(out)
    }
}

/// Multiply each pixel's alpha by the mask value.
fn apply_mask(image: &mut RgbaImage, mask: &GrayImage) {
    for (px, m) in image.pixels_mut().zip(mask.pixels()) {
        px[3] = mul_div255(px[3], m[0]);
    }
}

fn mul_div255(x: u8, y: u8) -> u8 {
    ((u32::from(x) * u32::from(y) + 127) / 255) as u8
}
