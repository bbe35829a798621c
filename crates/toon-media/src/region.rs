//! Placement region selection.
//!
//! Picks the rectangle of a template image that the stylized portrait
//! should cover. The largest detected face wins, since templates often
//! carry small background faces. Detector boxes on illustrations crop
//! foreheads and chins tightly, so the chosen box is padded more
//! vertically than horizontally.

use toon_models::{NormalizedRect, PixelRect};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Horizontal padding per side, as a fraction of the face box width.
pub const PAD_X_RATIO: f64 = 0.18;
/// Vertical padding per side, as a fraction of the face box height.
pub const PAD_Y_RATIO: f64 = 0.20;

/// Fallback anchor and width, as fractions of the template size.
pub const FALLBACK_X_RATIO: f64 = 0.15;
pub const FALLBACK_Y_RATIO: f64 = 0.20;
pub const FALLBACK_WIDTH_RATIO: f64 = 0.25;

/// Select the placement rectangle inside a `target_width` x `target_height` image.
///
/// `source_width`/`source_height` are the dimensions of the image that
/// will be placed; they only shape the fallback rectangle used when no
/// detection has a positive pixel area.
///
/// The returned rectangle always lies inside the target and is at least
/// one pixel in each dimension.
pub fn select_region(
    target_width: u32,
    target_height: u32,
    source_width: u32,
    source_height: u32,
    detections: &[NormalizedRect],
) -> MediaResult<PixelRect> {
    if target_width == 0 || target_height == 0 {
        return Err(MediaError::invalid_geometry(format!(
            "target image is empty ({}x{})",
            target_width, target_height
        )));
    }

    match largest_face(target_width, target_height, detections) {
        Some(face) => {
            let rect = pad_and_clamp(face, target_width, target_height);
            debug!(?rect, candidates = detections.len(), "Selected face region");
            Ok(rect)
        }
        None => {
            if source_width == 0 || source_height == 0 {
                return Err(MediaError::invalid_geometry(format!(
                    "source image is empty ({}x{})",
                    source_width, source_height
                )));
            }
            let rect = fallback_region(target_width, target_height, source_width, source_height);
            debug!(?rect, "No usable face detection, using fallback region");
            Ok(rect)
        }
    }
}

/// Largest detection by pixel area; the first one wins ties.
///
/// Detector output is untrusted, so areas saturate instead of overflowing.
fn largest_face(
    target_width: u32,
    target_height: u32,
    detections: &[NormalizedRect],
) -> Option<(i64, i64, i64, i64)> {
    let mut best = None;
    let mut best_area = 0i64;
    for det in detections.iter().filter(|d| d.is_usable()) {
        let (x, y, w, h) = det.to_pixels(target_width, target_height);
        if w <= 0 || h <= 0 {
            continue;
        }
        let area = w.saturating_mul(h);
        if area > best_area {
            best = Some((x, y, w, h));
            best_area = area;
        }
    }
    best
}

fn pad_and_clamp(face: (i64, i64, i64, i64), target_width: u32, target_height: u32) -> PixelRect {
    let (x, y, w, h) = face;
    let tw = i64::from(target_width);
    let th = i64::from(target_height);

    let pad_x = (w as f64 * PAD_X_RATIO) as i64;
    let pad_y = (h as f64 * PAD_Y_RATIO) as i64;

    let left = x.saturating_sub(pad_x).clamp(0, tw - 1);
    let top = y.saturating_sub(pad_y).clamp(0, th - 1);
    let width = w.saturating_add(pad_x.saturating_mul(2)).min(tw - left).max(1);
    let height = h.saturating_add(pad_y.saturating_mul(2)).min(th - top).max(1);

    PixelRect::new(left as u32, top as u32, width as u32, height as u32)
}

fn fallback_region(
    target_width: u32,
    target_height: u32,
    source_width: u32,
    source_height: u32,
) -> PixelRect {
    let tw = f64::from(target_width);
    let th = f64::from(target_height);

    let left = ((tw * FALLBACK_X_RATIO) as u32).min(target_width - 1);
    let top = ((th * FALLBACK_Y_RATIO) as u32).min(target_height - 1);
    let width = ((tw * FALLBACK_WIDTH_RATIO) as u32).clamp(1, target_width - left);
    let height = (u64::from(width) * u64::from(source_height) / u64::from(source_width))
        .clamp(1, u64::from(target_height - top)) as u32;

    PixelRect::new(left, top, width, height)
}
