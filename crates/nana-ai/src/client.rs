//! The generation client contract consumed by the orchestrator

use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::stream::SnapshotStream;
use crate::types::{Attachment, ModelConfig, Part, Turn};

/// Everything needed for one generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Prior conversation, reasoning already stripped from model turns
    pub history: Vec<Turn>,
    /// Prompt text for the new user turn (may be empty)
    pub prompt: String,
    /// Input images for the new user turn
    pub attachments: Vec<Attachment>,
    pub config: ModelConfig,
}

impl GenerationRequest {
    /// The new user turn, images first then prompt text
    pub fn user_turn(&self) -> Turn {
        Turn::user_prompt(&self.prompt, &self.attachments)
    }

    /// History followed by the new user turn
    pub fn contents(&self) -> Vec<Turn> {
        let mut contents = self.history.clone();
        contents.push(self.user_turn());
        contents
    }
}

/// Successful generation output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResult {
    pub parts: Vec<Part>,
}

impl GenerationResult {
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts }
    }
}

/// A client that can produce images from a prompt and conversation history
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Run a request to completion and return the full result
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<GenerationResult>;

    /// Run a request, yielding cumulative snapshots as output arrives.
    ///
    /// Clients without incremental delivery yield the batch result once.
    async fn stream(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<SnapshotStream> {
        let result = self.generate(request, cancel).await?;
        Ok(Box::pin(tokio_stream::once(Ok(result.parts))))
    }
}

/// Await `fut` unless `cancel` fires first, in which case `Error::Aborted` is returned.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(Error::Aborted);
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Aborted),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct Fixed;

    #[async_trait]
    impl GenerationClient for Fixed {
        async fn generate(
            &self,
            _request: &GenerationRequest,
            _cancel: CancellationToken,
        ) -> Result<GenerationResult> {
            Ok(GenerationResult::new(vec![Part::text("done")]))
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            history: vec![Turn::new(crate::Role::Model, vec![Part::text("earlier")])],
            prompt: "next".into(),
            attachments: vec![],
            config: ModelConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_default_stream_yields_once() {
        let mut stream = Fixed.stream(&request(), CancellationToken::new()).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, vec![Part::text("done")]);
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_contents_appends_user_turn() {
        let contents = request().contents();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[1].parts, vec![Part::text("next")]);
    }

    #[tokio::test]
    async fn test_cancellable_pre_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> = cancellable(&cancel, async { Ok(()) }).await;
        assert!(matches!(result, Err(Error::Aborted)));
    }
}
