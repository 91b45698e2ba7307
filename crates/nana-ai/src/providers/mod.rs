//! Generation providers

pub mod gemini;
pub mod openai_images;

use crate::{
    client::{GenerationClient, GenerationRequest, GenerationResult},
    error::Result,
    stream::SnapshotStream,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use gemini::GeminiClient;
pub use openai_images::{GPT_IMAGE_MODEL, OpenAiImageClient};

/// Which backend serves a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Gemini,
    OpenAiImages,
}

impl Backend {
    /// Pick the backend for a model name
    pub fn for_model(model: &str) -> Self {
        if model == GPT_IMAGE_MODEL {
            Backend::OpenAiImages
        } else {
            Backend::Gemini
        }
    }
}

/// Routes each request to the backend serving its model.
///
/// The model can change per request (step overrides), so dispatch happens on
/// every call rather than once at construction.
pub struct ProviderClient {
    gemini: GeminiClient,
    images: OpenAiImageClient,
}

impl ProviderClient {
    pub fn new(api_key: impl Into<String>, endpoint: Option<&str>) -> Self {
        let api_key = api_key.into();
        Self {
            gemini: GeminiClient::new(api_key.clone(), endpoint),
            images: OpenAiImageClient::new(api_key, endpoint),
        }
    }

    fn route(&self, request: &GenerationRequest) -> &dyn GenerationClient {
        match Backend::for_model(&request.config.model) {
            Backend::Gemini => &self.gemini,
            Backend::OpenAiImages => &self.images,
        }
    }
}

#[async_trait]
impl GenerationClient for ProviderClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<GenerationResult> {
        self.route(request).generate(request, cancel).await
    }

    async fn stream(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<SnapshotStream> {
        self.route(request).stream(request, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_routing() {
        assert_eq!(Backend::for_model(GPT_IMAGE_MODEL), Backend::OpenAiImages);
        assert_eq!(
            Backend::for_model("gemini-3-pro-image-preview"),
            Backend::Gemini
        );
        assert_eq!(Backend::for_model("anything-else"), Backend::Gemini);
    }
}
