//! HTTP client for an external face detection service.
//!
//! The service receives a PNG body at `POST {base_url}/detect` and answers
//! with relative face boxes:
//! `{"faces": [{"x": 0.1, "y": 0.2, "width": 0.3, "height": 0.3}]}`.

use std::io::Cursor;

use async_trait::async_trait;
use image::{ImageOutputFormat, RgbaImage};
use reqwest::Client;
use serde::Deserialize;
use toon_media::{FaceLocator, MediaError, MediaResult};
use toon_models::NormalizedRect;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    faces: Vec<NormalizedRect>,
}

/// Face locator backed by a detection service.
pub struct HttpFaceLocator {
    client: Client,
    endpoint: String,
}

impl HttpFaceLocator {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/detect", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl FaceLocator for HttpFaceLocator {
    async fn locate(&self, image: &RgbaImage) -> MediaResult<Vec<NormalizedRect>> {
        let owned = image.clone();
        let body = tokio::task::spawn_blocking(move || -> MediaResult<Vec<u8>> {
            let mut buf = Vec::new();
            owned.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)?;
            Ok(buf)
        })
        .await
        .map_err(|e| MediaError::internal(format!("png encode task failed: {}", e)))??;

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| MediaError::detection_failed(e.to_string()))?;

        let parsed: DetectResponse = response
            .json()
            .await
            .map_err(|e| MediaError::detection_failed(format!("invalid detection response: {}", e)))?;

        debug!(endpoint = %self.endpoint, faces = parsed.faces.len(), "Face service answered");
        Ok(parsed.faces)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
