//! nana-ai: image generation client abstraction
//!
//! This crate defines the content model shared with the conversation layer
//! (parts, turns, attachments), the [`GenerationClient`] contract used by the
//! orchestrator, and concrete clients for Gemini-compatible and OpenAI-style
//! image endpoints.

pub mod billing;
pub mod client;
pub mod error;
pub mod providers;
pub mod stream;
pub mod types;

pub use client::{GenerationClient, GenerationRequest, GenerationResult};
pub use error::{Error, ErrorCategory, Result};
pub use stream::{PartAccumulator, SnapshotStream};
pub use types::*;
