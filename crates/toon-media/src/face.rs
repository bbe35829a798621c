//! Face detection seam.

use async_trait::async_trait;
use image::RgbaImage;
use toon_models::NormalizedRect;

use crate::error::MediaResult;

/// Locates candidate faces in an image.
///
/// Implementations return zero or more boxes in relative coordinates.
/// An empty result is not an error; region selection falls back to a
/// fixed rectangle.
#[async_trait]
pub trait FaceLocator: Send + Sync {
    async fn locate(&self, image: &RgbaImage) -> MediaResult<Vec<NormalizedRect>>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Locator for deployments without a detection service.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaceLocator;

#[async_trait]
impl FaceLocator for NoFaceLocator {
    async fn locate(&self, _image: &RgbaImage) -> MediaResult<Vec<NormalizedRect>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}
