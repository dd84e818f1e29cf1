//! Image and video synthesis clients.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{BackendError, BackendResult};

/// Request for one still image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
    pub seed: u32,
}

/// Request for one raw video clip.
#[derive(Debug, Clone, Serialize)]
pub struct ClipRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub num_frames: u32,
    pub fps: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
    pub seed: u32,
}

/// Image synthesis capability.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Generate a PNG and write it to `out`.
    async fn generate_png(&self, request: &ImageRequest, out: &Path) -> BackendResult<()>;
}

/// Video clip synthesis capability.
#[async_trait]
pub trait VideoBackend: Send + Sync {
    /// Generate a raw MP4 clip and write it to `out`.
    async fn generate_clip(&self, request: &ClipRequest, out: &Path) -> BackendResult<()>;
}

/// Deterministic per-output seed derived from the output path, so identical
/// asset slots regenerate identically across attempts.
pub fn seed_for_path(path: &Path) -> u32 {
    let mut hasher = DefaultHasher::new();
    path.to_string_lossy().hash(&mut hasher);
    (hasher.finish() % (1 << 31)) as u32
}

/// Media client configuration.
#[derive(Debug, Clone)]
pub struct MediaClientConfig {
    /// Base URL of the synthesis service; empty disables the client
    pub base_url: String,
    /// Image model identifier forwarded to the service
    pub image_model: String,
    /// Video model identifier forwarded to the service
    pub video_model: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for MediaClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            image_model: "stabilityai/stable-diffusion-xl-base-1.0".to_string(),
            video_model: "Lightricks/LTX-Video".to_string(),
            request_timeout: Duration::from_secs(600),
        }
    }
}

impl MediaClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("MEDIA_BACKEND_URL").unwrap_or_default(),
            image_model: std::env::var("SDXL_MODEL")
                .unwrap_or_else(|_| "stabilityai/stable-diffusion-xl-base-1.0".to_string()),
            video_model: std::env::var("VIDEO_MODEL")
                .unwrap_or_else(|_| "Lightricks/LTX-Video".to_string()),
            request_timeout: Duration::from_secs(
                std::env::var("MEDIA_BACKEND_TIMEOUT_S")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }
}

#[derive(Serialize)]
struct ImagePayload<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a ImageRequest,
}

#[derive(Serialize)]
struct ClipPayload<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a ClipRequest,
}

/// HTTP client for the synthesis service.
///
/// The service returns raw media bytes (`image/png` or `video/mp4`); the
/// client writes them to the requested output path.
#[derive(Clone)]
pub struct HttpMediaClient {
    http: reqwest::Client,
    config: MediaClientConfig,
}

impl HttpMediaClient {
    pub fn new(config: MediaClientConfig) -> BackendResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> BackendResult<Self> {
        Self::new(MediaClientConfig::from_env())
    }

    fn base_url(&self) -> BackendResult<&str> {
        let url = self.config.base_url.trim_end_matches('/');
        if url.is_empty() {
            return Err(BackendError::NotConfigured(
                "MEDIA_BACKEND_URL not set".to_string(),
            ));
        }
        Ok(url)
    }

    async fn fetch_bytes<P: Serialize>(&self, url: String, payload: &P) -> BackendResult<Vec<u8>> {
        let response = self.http.post(&url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::service(
                status.as_u16(),
                message.chars().take(200).collect::<String>(),
            ));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(BackendError::decode("service returned an empty body"));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageBackend for HttpMediaClient {
    async fn generate_png(&self, request: &ImageRequest, out: &Path) -> BackendResult<()> {
        let url = format!("{}/v1/images", self.base_url()?);
        debug!(
            "Requesting image {}x{} from {}",
            request.width, request.height, url
        );

        let payload = ImagePayload {
            model: &self.config.image_model,
            request,
        };
        let bytes = self.fetch_bytes(url, &payload).await?;
        tokio::fs::write(out, &bytes).await?;

        info!("Wrote image: {} ({} bytes)", out.display(), bytes.len());
        Ok(())
    }
}

#[async_trait]
impl VideoBackend for HttpMediaClient {
    async fn generate_clip(&self, request: &ClipRequest, out: &Path) -> BackendResult<()> {
        let url = format!("{}/v1/clips", self.base_url()?);
        debug!(
            "Requesting clip {}x{} {} frames from {}",
            request.width, request.height, request.num_frames, url
        );

        let payload = ClipPayload {
            model: &self.config.video_model,
            request,
        };
        let bytes = self.fetch_bytes(url, &payload).await?;
        tokio::fs::write(out, &bytes).await?;

        info!("Wrote clip: {} ({} bytes)", out.display(), bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn image_request() -> ImageRequest {
        ImageRequest {
            prompt: "studio photo of basil".into(),
            negative_prompt: "text, watermark".into(),
            width: 1024,
            height: 1024,
            num_inference_steps: 30,
            guidance_scale: 6.5,
            seed: 7,
        }
    }

    #[test]
    fn seed_is_deterministic_and_bounded() {
        let a = seed_for_path(Path::new("/data/assets/1/ingredients/0.png"));
        let b = seed_for_path(Path::new("/data/assets/1/ingredients/0.png"));
        let c = seed_for_path(Path::new("/data/assets/1/ingredients/1.png"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < (1 << 31));
    }

    #[tokio::test]
    async fn generate_png_writes_response_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images"))
            .and(body_partial_json(serde_json::json!({
                "prompt": "studio photo of basil"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNGDATA".to_vec()))
            .mount(&server)
            .await;

        let client = HttpMediaClient::new(MediaClientConfig {
            base_url: server.uri(),
            ..MediaClientConfig::default()
        })
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("0.png");
        client.generate_png(&image_request(), &out).await.unwrap();

        assert_eq!(std::fs::read(&out).unwrap(), b"PNGDATA");
    }

    #[tokio::test]
    async fn service_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = HttpMediaClient::new(MediaClientConfig {
            base_url: server.uri(),
            ..MediaClientConfig::default()
        })
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("0.png");
        let err = client
            .generate_png(&image_request(), &out)
            .await
            .unwrap_err();
        match err {
            BackendError::Service { status, .. } => assert_eq!(status, 503),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn unconfigured_client_refuses() {
        let client = HttpMediaClient::new(MediaClientConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = client
            .generate_png(&image_request(), &dir.path().join("x.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured(_)));
    }
}
