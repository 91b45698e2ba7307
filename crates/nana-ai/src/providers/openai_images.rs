//! OpenAI-style image generation endpoint (`/v1/images/*`)
//!
//! Used for models that are not served through `generateContent`. The endpoint
//! returns image URLs, which are surfaced as a markdown text part.

use crate::{
    client::{GenerationClient, GenerationRequest, GenerationResult, cancellable},
    error::{Error, Result},
    types::{AspectRatio, Part, base_url},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Model name routed to this client
pub const GPT_IMAGE_MODEL: &str = "gpt-image-1.5-all";

/// Client for OpenAI-compatible image endpoints
pub struct OpenAiImageClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiImageClient {
    pub fn new(api_key: impl Into<String>, endpoint: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url(endpoint),
        }
    }

    fn endpoint(&self, is_edit: bool) -> String {
        let path = if is_edit {
            "/v1/images/edits"
        } else {
            "/v1/images/generations"
        };
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl GenerationClient for OpenAiImageClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<GenerationResult> {
        let body = build_request(request);
        let url = self.endpoint(!request.attachments.is_empty());
        tracing::debug!(model = %request.config.model, url = %url, "image endpoint request");

        let call = async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ImageErrorResponse>(&text)
                    .ok()
                    .and_then(|e| e.error.message)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
                return Err(Error::from_status(
                    status.as_u16(),
                    format!("Image API error ({}): {}", status.as_u16(), message),
                ));
            }

            let parsed: ImageResponse = response.json().await?;
            let url = parsed.first_url().ok_or_else(|| {
                Error::UnexpectedResponse(
                    "No image URL returned (checked urls, generations, data)".to_string(),
                )
            })?;

            Ok(GenerationResult::new(vec![Part::text(format!(
                "Generated Image: ![Generated Image]({})",
                url
            ))]))
        };

        cancellable(&cancel, call).await
    }
}

fn build_request(request: &GenerationRequest) -> ImageRequest {
    let ratio = match request.config.aspect_ratio {
        AspectRatio::Auto => AspectRatio::Square.as_str(),
        other => other.as_str(),
    };
    ImageRequest {
        model: request.config.model.clone(),
        prompt: request.prompt.clone(),
        n: 1,
        ratio,
        images: request.attachments.iter().map(|a| a.data_uri()).collect(),
    }
}

#[derive(Debug, Serialize)]
struct ImageRequest {
    model: String,
    prompt: String,
    n: u32,
    ratio: &'static str,
    images: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    urls: Vec<String>,
    #[serde(default)]
    generations: Vec<ImageUrl>,
    #[serde(default)]
    data: Vec<ImageUrl>,
}

impl ImageResponse {
    fn first_url(self) -> Option<String> {
        self.urls
            .into_iter()
            .next()
            .or_else(|| self.generations.into_iter().find_map(|g| g.url))
            .or_else(|| self.data.into_iter().find_map(|d| d.url))
    }
}

#[derive(Debug, Deserialize)]
struct ImageUrl {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageErrorResponse {
    error: ImageErrorBody,
}

#[derive(Debug, Deserialize)]
struct ImageErrorBody {
    message: Option<String>,
}
