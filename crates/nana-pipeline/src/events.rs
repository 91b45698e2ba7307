//! Pipeline event types

use serde::{Deserialize, Serialize};

use crate::conversation::ConversationEntry;
use crate::task::{RunMode, RunSummary, TaskStatus};

/// Events emitted while the orchestrator works
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A run started
    RunStart { mode: RunMode, total: usize },

    /// Batch progress changed; `0/0` means the batch ended
    Progress { completed: usize, total: usize },

    /// An entry was added to the transcript
    EntryAppended { entry: ConversationEntry },

    /// An entry was replaced with a new value
    EntryUpdated { entry: ConversationEntry },

    /// An entry was removed
    EntryRemoved { id: String },

    /// The transcript was cut back to `len` entries
    Truncated { len: usize },

    /// A task changed status
    TaskStatus {
        index: usize,
        task_id: String,
        status: TaskStatus,
    },

    /// A single generation started or finished
    BusyChanged { busy: bool },

    /// A run was refused because no credential is configured
    ApiKeyRequired,

    /// A run finished (completed, failed or stopped)
    RunEnd { summary: RunSummary },
}
