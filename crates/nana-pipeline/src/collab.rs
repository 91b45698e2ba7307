//! Collaborators the orchestrator reports to: image gallery, notifications
//! and the account balance.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An image produced by a task, handed to the [`ImageSink`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub mime_type: String,
    /// Base64 encoded bytes
    pub data: String,
    pub prompt: String,
    pub model: String,
    /// Unix ms
    pub timestamp: i64,
}

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

/// Receives every generated image
pub trait ImageSink: Send + Sync {
    fn record(&self, image: GeneratedImage);
}

/// Short user-facing notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// Refreshes the account balance after a task
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn refresh(&self) -> nana_ai::Result<()>;
}

/// Collaborator that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl ImageSink for Discard {
    fn record(&self, _image: GeneratedImage) {}
}

impl Notifier for Discard {
    fn notify(&self, _message: &str, _severity: Severity) {}
}

#[async_trait]
impl BalanceSource for Discard {
    async fn refresh(&self) -> nana_ai::Result<()> {
        Ok(())
    }
}

/// The full set of collaborators
#[derive(Clone)]
pub struct Collaborators {
    pub images: Arc<dyn ImageSink>,
    pub notifier: Arc<dyn Notifier>,
    pub balance: Arc<dyn BalanceSource>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            images: Arc::new(Discard),
            notifier: Arc::new(Discard),
            balance: Arc::new(Discard),
        }
    }
}
