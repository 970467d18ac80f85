use async_trait::async_trait;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prompt-to-image request sent upstream.
#[derive(Debug, Clone, Copy)]
pub struct ImageRequest<'a> {
    pub prompt: &'a str,
    pub negative_prompt: &'a str,
    pub reference_image: Option<&'a [u8]>,
}

/// A single generated image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Generative image backend. Latency is unknown and calls may cost money again on retry.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &ImageRequest<'_>) -> Result<GeneratedImage, ImageApiError>;
}

/// Client for Cloudflare Workers AI text-to-image models.
pub struct WorkersAiImageClient {
    http: Client,
    account_id: String,
    api_token: String,
    model: String,
}

#[derive(Serialize)]
struct TextToImageRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    negative_prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a [u8]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    strength: Option<f32>,
}

#[derive(Deserialize)]
struct TextToImageResponse {
    result: TextToImageResult,
}

#[derive(Deserialize)]
struct TextToImageResult {
    image: String,
}

/// How strongly a reference image constrains the output (0 keeps it, 1 ignores it).
const REFERENCE_STRENGTH: f32 = 0.65;

impl WorkersAiImageClient {
    pub fn new(account_id: &str, api_token: &str, model: &str) -> Result<Self, ImageApiError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(ImageApiError::Http)?;

        Ok(Self {
            http,
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "https://api.cloudflare.com/client/v4/accounts/{}/ai/run/{}",
            self.account_id, self.model
        )
    }
}

#[async_trait]
impl ImageGenerator for WorkersAiImageClient {
    async fn generate(&self, request: &ImageRequest<'_>) -> Result<GeneratedImage, ImageApiError> {
        let body = TextToImageRequest {
            prompt: request.prompt,
            negative_prompt: request.negative_prompt,
            image: request.reference_image,
            strength: request.reference_image.map(|_| REFERENCE_STRENGTH),
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(ImageApiError::Http)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ImageApiError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImageApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        let bytes = response.bytes().await.map_err(ImageApiError::Http)?;

        match content_type.as_deref() {
            // Flux-style models wrap a base64 image in the usual JSON envelope.
            Some("application/json") => {
                let parsed: TextToImageResponse =
                    serde_json::from_slice(&bytes).map_err(ImageApiError::Parse)?;
                let data = base64::engine::general_purpose::STANDARD
                    .decode(parsed.result.image.as_bytes())
                    .map_err(ImageApiError::Base64)?;
                image_from_bytes(data, None)
            }
            other => image_from_bytes(bytes.to_vec(), other),
        }
    }
}

/// Wrap upstream bytes, trusting an image `Content-Type` and otherwise sniffing the format.
pub fn image_from_bytes(
    data: Vec<u8>,
    content_type: Option<&str>,
) -> Result<GeneratedImage, ImageApiError> {
    if data.is_empty() {
        return Err(ImageApiError::EmptyImage);
    }

    let mime_type = match content_type {
        Some(ct) if ct.starts_with("image/") => ct.to_string(),
        _ => image::guess_format(&data)
            .map(|format| format.to_mime_type().to_string())
            .map_err(|_| ImageApiError::UnrecognizedFormat)?,
    };

    Ok(GeneratedImage { data, mime_type })
}

#[derive(Debug, thiserror::Error)]
pub enum ImageApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream rate limit hit")]
    RateLimited,

    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse image response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to decode base64 image: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Upstream returned an empty image")]
    EmptyImage,

    #[error("Upstream returned bytes in an unrecognized image format")]
    UnrecognizedFormat,

    #[error("Upstream call exceeded {0:?}")]
    Timeout(Duration),
}
