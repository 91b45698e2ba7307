//! Task definitions, pipeline modes and run bookkeeping

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of one task in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Error,
}

/// One prompt to run, optionally on a specific model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    /// User-facing message when `status` is `Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskDefinition {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            model_override: None,
            status: TaskStatus::Pending,
            error: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }
}

/// Topology of a multi-step run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// Each step consumes the previous step's images
    Serial,
    /// Every step runs on the same input images
    Parallel,
    /// Every input image runs through every step
    Combination,
}

impl PipelineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineMode::Serial => "serial",
            PipelineMode::Parallel => "parallel",
            PipelineMode::Combination => "combination",
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "serial" => Ok(PipelineMode::Serial),
            "parallel" => Ok(PipelineMode::Parallel),
            "combination" => Ok(PipelineMode::Combination),
            other => Err(format!(
                "unknown pipeline mode '{}' (expected serial, parallel or combination)",
                other
            )),
        }
    }
}

/// Kind of run, as reported in events and summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Single,
    Repeat,
    Serial,
    Parallel,
    Combination,
}

impl From<PipelineMode> for RunMode {
    fn from(mode: PipelineMode) -> Self {
        match mode {
            PipelineMode::Serial => RunMode::Serial,
            PipelineMode::Parallel => RunMode::Parallel,
            PipelineMode::Combination => RunMode::Combination,
        }
    }
}

/// `completed` of `total` tasks finished. `0/0` means idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(completed: usize, total: usize) -> Self {
        Self { completed, total }
    }

    pub fn is_idle(&self) -> bool {
        self.total == 0
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Images produced across all tasks
    pub images: usize,
    /// The run was stopped by the user
    pub cancelled: bool,
    pub tasks: Vec<TaskDefinition>,
}

impl RunSummary {
    pub fn new(mode: RunMode, total: usize) -> Self {
        Self {
            mode,
            total,
            completed: 0,
            failed: 0,
            images: 0,
            cancelled: false,
            tasks: Vec::new(),
        }
    }
}
