//! Insertion of a stylized portrait into a template image on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{ImageFormat, RgbaImage};
use toon_models::PixelRect;
use tracing::{debug, info};

use crate::compositor::Compositor;
use crate::error::{MediaError, MediaResult};
use crate::face::FaceLocator;
use crate::placement::fit_and_center;
use crate::region::select_region;

/// Locates the face region of a template and composites a stylized
/// image into it.
///
/// Decoding, resizing and encoding run on the blocking pool; only the
/// face locator call runs on the async runtime.
#[derive(Clone)]
pub struct FaceInserter {
    locator: Arc<dyn FaceLocator>,
    compositor: Compositor,
}

impl FaceInserter {
    pub fn new(locator: Arc<dyn FaceLocator>) -> Self {
        Self {
            locator,
            compositor: Compositor::default(),
        }
    }

    pub fn with_compositor(mut self, compositor: Compositor) -> Self {
        self.compositor = compositor;
        self
    }

    /// Composite `stylized_path` into `template_path` and write a PNG to
    /// `output_path`. Returns the region that was covered.
    ///
    /// The template file is only read.
    pub async fn insert(
        &self,
        stylized_path: &Path,
        template_path: &Path,
        output_path: &Path,
    ) -> MediaResult<PixelRect> {
        let stylized_src = stylized_path.to_path_buf();
        let template_src = template_path.to_path_buf();
        let (stylized, template) = tokio::task::spawn_blocking(move || -> MediaResult<_> {
            Ok((load_rgba(&stylized_src)?, load_rgba(&template_src)?))
        })
        .await
        .map_err(|e| MediaError::internal(format!("image decode task failed: {}", e)))??;

        let detections = self.locator.locate(&template).await?;
        debug!(
            locator = self.locator.name(),
            faces = detections.len(),
            "Face detection finished"
        );

        // Geometry runs with the compositing so a panic on detector
        // output surfaces as a join error
        let compositor = self.compositor;
        let output: PathBuf = output_path.to_path_buf();
        let rect = tokio::task::spawn_blocking(move || -> MediaResult<PixelRect> {
            let rect = select_region(
                template.width(),
                template.height(),
                stylized.width(),
                stylized.height(),
                &detections,
            )?;
            let placement = fit_and_center(stylized.width(), stylized.height(), &rect)?;
            let composed = compositor.composite(&stylized, &template, &rect, &placement)?;
            composed.save_with_format(&output, ImageFormat::Png)?;
            Ok(rect)
        })
        .await
        .map_err(|e| MediaError::internal(format!("compositing task failed: {}", e)))??;

        info!(
            region = ?rect,
            feather_radius = self.compositor.feather_radius(),
            output = %output_path.display(),
            "Inserted stylized image into template"
        );
        Ok(rect)
    }
}

fn load_rgba(path: &Path) -> MediaResult<RgbaImage> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| MediaError::image_load(path, e))
}
