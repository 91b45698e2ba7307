//! Incremental result types and chunk accumulation

use std::pin::Pin;
use tokio_stream::Stream;

use crate::error::Result;
use crate::types::{FALLBACK_IMAGE_MIME, Part};

/// A stream of cumulative part snapshots.
///
/// Every item is the complete part list seen so far, not a delta. The stream
/// ends when generation completes or the request is cancelled.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<Vec<Part>>> + Send>>;

/// Merges raw response fragments into an ordered part list.
///
/// Consecutive text fragments of the same kind (answer or reasoning) are
/// concatenated into one part; each inline image becomes its own part.
#[derive(Debug, Default, Clone)]
pub struct PartAccumulator {
    parts: Vec<Part>,
}

impl PartAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text fragment
    pub fn push_text(&mut self, text: &str, reasoning: bool) {
        match (self.parts.last_mut(), reasoning) {
            (Some(Part::Text { text: last }), false) => last.push_str(text),
            (Some(Part::Thinking { thinking: last }), true) => last.push_str(text),
            (_, false) => self.parts.push(Part::text(text)),
            (_, true) => self.parts.push(Part::thinking(text)),
        }
    }

    /// Add an inline image fragment
    pub fn push_image(&mut self, mime_type: Option<&str>, data: &str, reasoning: bool) {
        let mime_type = mime_type
            .filter(|m| !m.is_empty())
            .unwrap_or(FALLBACK_IMAGE_MIME);
        let part = if reasoning {
            Part::thinking_image(data, mime_type)
        } else {
            Part::image(data, mime_type)
        };
        self.parts.push(part);
    }

    /// Current snapshot
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn into_parts(self) -> Vec<Part> {
        self.parts
    }
}
