//! nana-pipeline: conversation state and generation orchestration
//!
//! This crate owns the conversation transcript and the orchestrator that runs
//! single generations, repeat batches and multi-step pipelines (serial,
//! parallel and combinatorial) against a [`nana_ai::GenerationClient`].

pub mod accumulator;
pub mod collab;
pub mod conversation;
pub mod error;
pub mod events;
mod fan_out;
pub mod handle;
pub mod history;
pub mod orchestrator;
mod serial;
pub mod settings;
pub mod task;

#[cfg(test)]
mod test_support;

pub use collab::{BalanceSource, Collaborators, GeneratedImage, ImageSink, Notifier, Severity};
pub use conversation::{Conversation, ConversationEntry, ConversationStore};
pub use error::{Error, Result};
pub use events::PipelineEvent;
pub use handle::OrchestratorHandle;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use settings::{ModelOverride, Settings, SettingsStore};
pub use task::{PipelineMode, Progress, RunMode, RunSummary, TaskDefinition, TaskStatus};
