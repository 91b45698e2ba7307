//! Error types for nana-pipeline

use thiserror::Error;

/// Result type alias using nana-pipeline Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end a run before or during orchestration
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the generation layer
    #[error(transparent)]
    Ai(#[from] nana_ai::Error),

    /// No credential configured; the caller should prompt for one
    #[error("No API key configured")]
    MissingApiKey,

    /// Request rejected before any task started
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A serial pipeline step failed and the chain was stopped
    #[error("Step {step} failed: {message}")]
    StepFailed { step: usize, message: String },

    /// Another run is in progress
    #[error("Another run is already in progress")]
    Busy,

    /// No conversation entry with this id (or no turn to regenerate)
    #[error("Conversation entry not found: {0}")]
    EntryNotFound(String),
}
