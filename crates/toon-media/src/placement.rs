//! Cover-fit placement of a source image inside a target rectangle.

use toon_models::PixelRect;

use crate::error::{MediaError, MediaResult};

/// Size and position of the scaled source inside the target image.
///
/// Offsets are absolute target-image coordinates of the scaled source's
/// top-left corner. They may be negative, or extend past the rectangle,
/// because the source covers the rectangle rather than fitting inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub width: u32,
    pub height: u32,
    pub offset_x: i64,
    pub offset_y: i64,
}

/// Scale a `source_width` x `source_height` image to cover `rect` without
/// distortion, centered on the rectangle.
///
/// The source is first scaled to the rectangle's width. If that leaves it
/// shorter than the rectangle, it is rescaled to the rectangle's height
/// instead. Centering uses floor division.
pub fn fit_and_center(source_width: u32, source_height: u32, rect: &PixelRect) -> MediaResult<Placement> {
    if source_width == 0 || source_height == 0 {
        return Err(MediaError::invalid_geometry(format!(
            "cannot place an empty source ({}x{})",
            source_width, source_height
        )));
    }
    if rect.width == 0 || rect.height == 0 {
        return Err(MediaError::invalid_geometry(format!(
            "cannot place into an empty region ({}x{})",
            rect.width, rect.height
        )));
    }

    let sw = u64::from(source_width);
    let sh = u64::from(source_height);

    let mut width = u64::from(rect.width);
    let mut height = width * sh / sw;
    if height < u64::from(rect.height) {
        height = u64::from(rect.height);
        width = height * sw / sh;
    }

    let width = u32::try_from(width.max(1))
        .map_err(|_| MediaError::invalid_geometry("scaled width overflows"))?;
    let height = u32::try_from(height.max(1))
        .map_err(|_| MediaError::invalid_geometry("scaled height overflows"))?;

    let offset_x = i64::from(rect.x) + (i64::from(rect.width) - i64::from(width)).div_euclid(2);
    let offset_y = i64::from(rect.y) + (i64::from(rect.height) - i64::from(height)).div_euclid(2);

    Ok(Placement {
        width,
        height,
        offset_x,
        offset_y,
    })
}
