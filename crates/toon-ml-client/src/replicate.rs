//! Replicate predictions client for image stylization.
//!
//! Creates a prediction for an image-editing model, waits for it to reach
//! a terminal status and downloads the produced image.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::{MlError, MlResult};
use crate::extract::extract_output_reference;
use crate::stylizer::{StylizeRequest, Stylizer};

pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com";
pub const DEFAULT_MODEL: &str = "black-forest-labs/flux-kontext-pro";

/// Prompt used when the task carries no usable prompt of its own.
pub const DEFAULT_PROMPT: &str = "Transform this child's face into a soft children's-book illustration style. \
Pastel colors, clean outlines, gentle shading, warm expression, stylized but identity-preserving illustration.";

/// Configuration for the Replicate client.
#[derive(Clone)]
pub struct ReplicateConfig {
    /// API token; calls fail with a configuration error when absent
    pub api_token: Option<String>,
    /// Model in `owner/name` form
    pub model: String,
    /// API root, overridable for tests and proxies
    pub base_url: String,
    /// Delay between status polls of a running prediction
    pub poll_interval: Duration,
    /// Model input key that accepts a style reference image, if the model has one
    pub style_input_key: Option<String>,
}

impl std::fmt::Debug for ReplicateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicateConfig")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .field("style_input_key", &self.style_input_key)
            .finish()
    }
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_secs(1),
            style_input_key: None,
        }
    }
}

impl ReplicateConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            api_token: std::env::var("REPLICATE_API_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            model: std::env::var("REPLICATE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: std::env::var("REPLICATE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            poll_interval: Duration::from_millis(
                std::env::var("REPLICATE_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            style_input_key: std::env::var("REPLICATE_STYLE_INPUT_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_style_input_key(mut self, key: impl Into<String>) -> Self {
        self.style_input_key = Some(key.into());
        self
    }
}

/// Prediction as returned by create and get.
#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: Option<String>,
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }
}

/// Replicate API client.
pub struct ReplicateClient {
    config: ReplicateConfig,
    client: Client,
}

impl ReplicateClient {
    pub fn new(config: ReplicateConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(ReplicateConfig::from_env())
    }

    pub fn config(&self) -> &ReplicateConfig {
        &self.config
    }

    /// Build the model input for a request.
    async fn build_input(&self, request: &StylizeRequest) -> MlResult<Value> {
        let mut input = Map::new();
        input.insert(
            "input_image".into(),
            Value::String(data_uri(&request.input_path).await?),
        );

        let prompt = request
            .prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PROMPT);
        input.insert("prompt".into(), Value::String(prompt.to_string()));
        input.insert("output_format".into(), Value::String("png".into()));

        match (&request.style_reference, &self.config.style_input_key) {
            (Some(reference), Some(key)) => {
                input.insert(key.clone(), Value::String(data_uri(reference).await?));
            }
            (Some(reference), None) => {
                debug!(
                    reference = %reference.display(),
                    model = %self.config.model,
                    "Model takes no style reference input; relying on prompt"
                );
            }
            (None, _) => {}
        }

        Ok(Value::Object(input))
    }

    async fn create_prediction(&self, token: &str, input: Value) -> MlResult<Prediction> {
        let url = format!(
            "{}/v1/models/{}/predictions",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("Prefer", "wait")
            .json(&json!({ "input": input }))
            .send()
            .await
            .map_err(|e| MlError::request(e.to_string()))?;
        parse_prediction(response).await
    }

    async fn get_prediction(&self, token: &str, url: &str) -> MlResult<Prediction> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| MlError::request(e.to_string()))?;
        parse_prediction(response).await
    }

    /// Poll until the prediction reaches a terminal status.
    async fn wait_for(&self, token: &str, mut prediction: Prediction) -> MlResult<Prediction> {
        while !prediction.is_terminal() {
            let url = prediction
                .urls
                .as_ref()
                .and_then(|u| u.get.clone())
                .ok_or_else(|| {
                    MlError::prediction_failed(format!(
                        "prediction is {} but has no status URL",
                        prediction.status
                    ))
                })?;
            debug!(id = ?prediction.id, status = %prediction.status, "Prediction still running");
            tokio::time::sleep(self.config.poll_interval).await;
            prediction = self.get_prediction(token, &url).await?;
        }
        Ok(prediction)
    }

    /// Fetch the output image from a URL or an inline `data:` URI.
    async fn download(&self, reference: &str) -> MlResult<Vec<u8>> {
        if let Some(rest) = reference.strip_prefix("data:") {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| MlError::download("malformed data URI"))?;
            if !header.ends_with(";base64") {
                return Err(MlError::download("data URI is not base64 encoded"));
            }
            return BASE64
                .decode(payload)
                .map_err(|e| MlError::download(format!("invalid base64 payload: {}", e)));
        }

        let response = self
            .client
            .get(reference)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| MlError::download(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| MlError::download(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Stylizer for ReplicateClient {
    async fn stylize(&self, request: &StylizeRequest) -> MlResult<Vec<u8>> {
        let token = self
            .config
            .api_token
            .as_deref()
            .ok_or_else(|| MlError::config("REPLICATE_API_TOKEN is not set"))?;

        let input = self.build_input(request).await?;
        info!(model = %self.config.model, "Calling stylization model");

        let prediction = self.create_prediction(token, input).await?;
        let prediction = self.wait_for(token, prediction).await?;

        if prediction.status != "succeeded" {
            let detail = match &prediction.error {
                Value::Null => "no error detail".to_string(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            warn!(id = ?prediction.id, status = %prediction.status, "Prediction did not succeed");
            return Err(MlError::prediction_failed(format!("{}: {}", prediction.status, detail)));
        }

        let reference = extract_output_reference(&prediction.output)?;
        let bytes = self.download(&reference).await?;
        info!(bytes = bytes.len(), "Downloaded stylized image");
        Ok(bytes)
    }
}

async fn parse_prediction(response: reqwest::Response) -> MlResult<Prediction> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(MlError::Api {
            status: status.as_u16(),
            body,
        });
    }
    let body = response
        .text()
        .await
        .map_err(|e| MlError::request(e.to_string()))?;
    Ok(serde_json::from_str(&body)?)
}

/// Encode a file as a base64 `data:` URI.
async fn data_uri(path: &Path) -> MlResult<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(format!("data:{};base64,{}", mime_for(path), BASE64.encode(bytes)))
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "acme/toon";
    const CREATE_PATH: &str = "/v1/models/acme/toon/predictions";

    fn client_for(server: &MockServer) -> ReplicateClient {
        ReplicateClient::new(
            ReplicateConfig::default()
                .with_api_token("test-token")
                .with_model(MODEL)
                .with_base_url(server.uri())
                .with_poll_interval(Duration::from_millis(5)),
        )
    }

    fn photo(dir: &TempDir) -> PathBuf {
        let p = dir.path().join("input.jpg");
        std::fs::write(&p, b"jpeg-bytes").unwrap();
        p
    }

    #[tokio::test]
    async fn test_stylize_downloads_output_url() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("POST"))
            .and(path(CREATE_PATH))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p1",
                "status": "succeeded",
                "output": format!("{}/files/out.png", server.uri()),
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/out.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-bytes".to_vec()))
            .mount(&server)
            .await;

        let request = StylizeRequest::new(photo(&dir)).with_prompt(Some("a pirate".into()));
        let bytes = client_for(&server).stylize(&request).await.unwrap();
        assert_eq!(bytes, b"png-bytes");

        let received = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["input"]["prompt"], "a pirate");
        assert_eq!(body["input"]["output_format"], "png");
        assert!(body["input"]["input_image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn test_blank_prompt_uses_default() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("POST"))
            .and(path(CREATE_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "status": "succeeded",
                "output": "data:image/png;base64,cG5n",
            })))
            .mount(&server)
            .await;

        let request = StylizeRequest::new(photo(&dir)).with_prompt(Some("   ".into()));
        let bytes = client_for(&server).stylize(&request).await.unwrap();
        assert_eq!(bytes, b"png");

        let received = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["input"]["prompt"], DEFAULT_PROMPT);
    }

    #[tokio::test]
    async fn test_running_prediction_is_polled() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("POST"))
            .and(path(CREATE_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "p2",
                "status": "processing",
                "urls": { "get": format!("{}/v1/predictions/p2", server.uri()) },
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "p2",
                "status": "succeeded",
                "output": [format!("{}/files/p2.png", server.uri())],
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/p2.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"p2".to_vec()))
            .mount(&server)
            .await;

        let bytes = client_for(&server)
            .stylize(&StylizeRequest::new(photo(&dir)))
            .await
            .unwrap();
        assert_eq!(bytes, b"p2");
    }

    #[tokio::test]
    async fn test_failed_prediction_is_an_error() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("POST"))
            .and(path(CREATE_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "status": "failed",
                "error": "NSFW content detected",
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .stylize(&StylizeRequest::new(photo(&dir)))
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::PredictionFailed(ref m) if m.contains("NSFW")));
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("POST"))
            .and(path(CREATE_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .stylize(&StylizeRequest::new(photo(&dir)))
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::Api { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_unusable_output_reports_raw() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        Mock::given(method("POST"))
            .and(path(CREATE_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "status": "succeeded",
                "output": { "frames": 3 },
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .stylize(&StylizeRequest::new(photo(&dir)))
            .await
            .unwrap_err();
        assert!(err.raw_output().unwrap().contains("frames"));
    }

    #[tokio::test]
    async fn test_missing_token_makes_no_call() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        let client = ReplicateClient::new(ReplicateConfig::default().with_base_url(server.uri()));
        let err = client
            .stylize(&StylizeRequest::new(photo(&dir)))
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::Config(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ReplicateConfig::default().with_api_token("r8_secret");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("r8_secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_style_reference_sent_when_model_accepts_it() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let style = dir.path().join("template.png");
        std::fs::write(&style, b"tpl").unwrap();

        Mock::given(method("POST"))
            .and(path(CREATE_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "status": "succeeded",
                "output": "data:image/png;base64,cG5n",
            })))
            .mount(&server)
            .await;

        let client = ReplicateClient::new(
            ReplicateConfig::default()
                .with_api_token("t")
                .with_model(MODEL)
                .with_base_url(server.uri())
                .with_style_input_key("style_image"),
        );
        let request = StylizeRequest::new(photo(&dir)).with_style_reference(Some(style));
        client.stylize(&request).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert!(body["input"]["style_image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }
}
