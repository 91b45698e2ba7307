//! The orchestrator: runs single generations, repeat batches and pipelines
//! against a generation client and reconciles results into the transcript.

use futures::StreamExt;
use nana_ai::client::cancellable;
use nana_ai::{Attachment, GenerationClient, GenerationRequest, MAX_ATTACHMENTS, Part};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::accumulator::ThinkingTimer;
use crate::collab::{Collaborators, GeneratedImage, Severity};
use crate::conversation::{ConversationEntry, ConversationStore};
use crate::error::{Error, Result};
use crate::events::PipelineEvent;
use crate::handle::{BusyGuard, OrchestratorHandle};
use crate::history;
use crate::settings::SettingsStore;
use crate::task::{PipelineMode, Progress, RunMode, RunSummary, TaskDefinition, TaskStatus};

/// Label recorded for images generated from an empty prompt
const UNTITLED_PROMPT: &str = "image generation";

/// Timing and limits for batch runs
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Pause between repeat-N tasks
    pub repeat_delay: Duration,
    /// Pause between serial steps
    pub step_delay: Duration,
    /// Pause after a serial step before its output is read back
    pub settle_delay: Duration,
    /// Upper bound for repeat-N
    pub max_repeat: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            repeat_delay: Duration::from_millis(500),
            step_delay: Duration::from_millis(500),
            settle_delay: Duration::from_millis(100),
            max_repeat: 4,
        }
    }
}

/// How a single task ended
#[derive(Debug)]
pub(crate) enum TaskOutcome {
    Completed { entry_id: String, images: usize },
    Cancelled,
    Failed { error: nana_ai::Error },
}

/// Runs generation tasks and merges their output into the conversation
pub struct Orchestrator {
    pub(crate) config: OrchestratorConfig,
    pub(crate) client: Arc<dyn GenerationClient>,
    pub(crate) conversation: ConversationStore,
    pub(crate) settings: SettingsStore,
    pub(crate) collab: Collaborators,
    event_tx: broadcast::Sender<PipelineEvent>,
    pub(crate) handle: OrchestratorHandle,
}

impl Orchestrator {
    /// Create a new orchestrator with an empty conversation
    pub fn new(
        client: Arc<dyn GenerationClient>,
        settings: SettingsStore,
        collab: Collaborators,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config: OrchestratorConfig::default(),
            client,
            conversation: ConversationStore::new(),
            settings,
            collab,
            event_tx,
            handle: OrchestratorHandle::new(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_tx.subscribe()
    }

    pub fn conversation(&self) -> &ConversationStore {
        &self.conversation
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Get a cloneable handle for stopping the orchestrator from external code.
    pub fn handle(&self) -> OrchestratorHandle {
        self.handle.clone()
    }

    /// Stop the generation in flight
    pub fn stop(&self) {
        self.handle.stop();
    }

    pub(crate) fn emit(&self, event: PipelineEvent) {
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn notify(&self, message: &str, severity: Severity) {
        self.collab.notifier.notify(message, severity);
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Send a prompt, `repeat` times in a row (clamped to `1..=max_repeat`).
    pub async fn send(
        &self,
        prompt: &str,
        attachments: Vec<Attachment>,
        repeat: usize,
    ) -> Result<RunSummary> {
        self.require_api_key()?;
        validate_attachments(&attachments)?;
        let _run = self.handle.try_begin_run().ok_or(Error::Busy)?;

        let count = repeat.clamp(1, self.config.max_repeat.max(1));
        let summary = if count == 1 {
            self.run_single(prompt, &attachments).await
        } else {
            self.run_repeat(prompt, &attachments, count).await
        };
        self.emit(PipelineEvent::RunEnd {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    /// Run a multi-step pipeline.
    ///
    /// Serial pipelines return `Error::StepFailed` when a step fails; fan-out
    /// pipelines report failures per task in the summary.
    pub async fn run_pipeline(
        &self,
        mode: PipelineMode,
        steps: Vec<TaskDefinition>,
        attachments: Vec<Attachment>,
    ) -> Result<RunSummary> {
        self.require_api_key()?;
        validate_pipeline(mode, &steps, &attachments)?;
        let _run = self.handle.try_begin_run().ok_or(Error::Busy)?;

        tracing::info!(mode = %mode, steps = steps.len(), inputs = attachments.len(), "pipeline start");
        match mode {
            PipelineMode::Serial => self.run_serial(steps, attachments).await,
            PipelineMode::Parallel | PipelineMode::Combination => {
                Ok(self.run_fan_out(mode, steps, attachments).await)
            }
        }
    }

    /// Re-run the turn that produced `entry_id`, discarding it and everything
    /// after it.
    pub async fn regenerate(&self, entry_id: &str) -> Result<RunSummary> {
        self.require_api_key()?;
        let _run = self.handle.try_begin_run().ok_or(Error::Busy)?;

        let user = self
            .conversation
            .write(|c| c.rewind_to_turn(entry_id))
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;
        self.emit(PipelineEvent::Truncated {
            len: self.conversation.len(),
        });

        let prompt = user.first_text().unwrap_or_default().to_string();
        let attachments = user
            .images()
            .filter_map(Part::as_image)
            .map(|(mime_type, data)| Attachment::from_base64(data, mime_type))
            .collect::<nana_ai::Result<Vec<_>>>()?;

        tracing::info!(entry = %entry_id, "regenerating");
        let summary = self.run_single(&prompt, &attachments).await;
        self.emit(PipelineEvent::RunEnd {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    /// Remove one entry from the transcript
    pub fn delete_entry(&self, entry_id: &str) -> Result<()> {
        if self.conversation.write(|c| c.delete(entry_id)) {
            self.emit(PipelineEvent::EntryRemoved {
                id: entry_id.to_string(),
            });
            Ok(())
        } else {
            Err(Error::EntryNotFound(entry_id.to_string()))
        }
    }

    /// Remove every entry from the transcript
    pub fn clear_conversation(&self) {
        self.conversation.write(|c| c.clear());
        self.emit(PipelineEvent::Truncated { len: 0 });
    }

    // ------------------------------------------------------------------
    // Run bodies
    // ------------------------------------------------------------------

    async fn run_single(&self, prompt: &str, attachments: &[Attachment]) -> RunSummary {
        let mut summary = RunSummary::new(RunMode::Single, 1);
        let mut task = TaskDefinition::new(prompt);
        self.emit(PipelineEvent::RunStart {
            mode: RunMode::Single,
            total: 1,
        });

        self.set_task_status(0, &mut task, TaskStatus::Running, None);
        match self.execute_task(prompt, attachments).await {
            TaskOutcome::Completed { images, .. } => {
                summary.completed = 1;
                summary.images = images;
                self.set_task_status(0, &mut task, TaskStatus::Completed, None);
            }
            TaskOutcome::Cancelled => {
                summary.cancelled = true;
                self.set_task_status(0, &mut task, TaskStatus::Pending, None);
            }
            TaskOutcome::Failed { error } => {
                summary.failed = 1;
                self.set_task_status(0, &mut task, TaskStatus::Error, Some(error.user_message()));
            }
        }
        summary.tasks.push(task);
        summary
    }

    async fn run_repeat(&self, prompt: &str, attachments: &[Attachment], count: usize) -> RunSummary {
        let mut summary = RunSummary::new(RunMode::Repeat, count);
        let mut tasks: Vec<TaskDefinition> =
            (0..count).map(|_| TaskDefinition::new(prompt)).collect();

        self.emit(PipelineEvent::RunStart {
            mode: RunMode::Repeat,
            total: count,
        });
        self.notify(
            &format!("Starting batch generation: {} images", count),
            Severity::Info,
        );

        for index in 0..count {
            self.set_progress(index + 1, count);
            self.set_task_status(index, &mut tasks[index], TaskStatus::Running, None);

            match self.execute_task(prompt, attachments).await {
                TaskOutcome::Completed { images, .. } => {
                    summary.completed += 1;
                    summary.images += images;
                    self.set_task_status(index, &mut tasks[index], TaskStatus::Completed, None);
                }
                TaskOutcome::Failed { error } => {
                    let message = error.user_message();
                    summary.failed += 1;
                    self.notify(
                        &format!("Batch task {} failed: {}", index + 1, message),
                        Severity::Error,
                    );
                    self.set_task_status(index, &mut tasks[index], TaskStatus::Error, Some(message));
                }
                TaskOutcome::Cancelled => {
                    tracing::info!(task = index + 1, "batch stopped");
                    summary.cancelled = true;
                    self.set_task_status(index, &mut tasks[index], TaskStatus::Pending, None);
                    break;
                }
            }

            if index + 1 < count {
                tokio::time::sleep(self.config.repeat_delay).await;
            }
        }

        self.set_progress(0, 0);
        if !summary.cancelled {
            self.notify(
                &format!(
                    "Batch generation finished: {} of {} succeeded",
                    summary.completed, count
                ),
                Severity::Success,
            );
        }
        summary.tasks = tasks;
        summary
    }

    // ------------------------------------------------------------------
    // Single-task execution
    // ------------------------------------------------------------------

    /// Run one prompt end to end: append the turn, call the client, reconcile
    /// the placeholder and report the outcome.
    pub(crate) async fn execute_task(&self, prompt: &str, attachments: &[Attachment]) -> TaskOutcome {
        let settings = self.settings.snapshot();
        let request = GenerationRequest {
            history: self.conversation.read(|c| history::project(c.entries())),
            prompt: prompt.to_string(),
            attachments: attachments.to_vec(),
            config: settings.model.clone(),
        };

        let busy = BusyGuard::new(&self.handle);
        self.emit(PipelineEvent::BusyChanged { busy: true });

        self.append(ConversationEntry::user(request.user_turn().parts));
        let placeholder = ConversationEntry::placeholder();
        let entry_id = placeholder.id.clone();
        self.append(placeholder);

        let cancel = self.handle.begin_task();
        tracing::debug!(model = %request.config.model, stream = settings.stream, "task start");
        let result = if settings.stream {
            self.generate_streaming(&request, &entry_id, &cancel).await
        } else {
            self.generate_batch(&request, &entry_id, &cancel).await
        };

        let outcome = match result {
            Ok(parts) => {
                let images = self.record_images(prompt, &request.config.model, &parts);
                tracing::debug!(images, "task complete");
                TaskOutcome::Completed { entry_id, images }
            }
            Err(e) if e.is_cancelled() || cancel.is_cancelled() => {
                tracing::info!("generation stopped");
                TaskOutcome::Cancelled
            }
            Err(e) => {
                tracing::warn!(category = e.category().label(), "generation failed: {}", e);
                let message = format!("Error: {}", e.user_message());
                self.update_entry(&entry_id, |entry| {
                    entry.parts = vec![Part::text(message)];
                    entry.is_error = true;
                });
                TaskOutcome::Failed { error: e }
            }
        };

        drop(busy);
        self.emit(PipelineEvent::BusyChanged { busy: false });

        if let Err(e) = self.collab.balance.refresh().await {
            tracing::debug!("balance refresh failed: {}", e);
        }
        outcome
    }

    async fn generate_streaming(
        &self,
        request: &GenerationRequest,
        entry_id: &str,
        cancel: &CancellationToken,
    ) -> nana_ai::Result<Vec<Part>> {
        let mut timer = ThinkingTimer::start();
        let mut stream = cancellable(cancel, self.client.stream(request, cancel.clone())).await?;
        let mut last = Vec::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(nana_ai::Error::Aborted),
                next = stream.next() => next,
            };
            let Some(snapshot) = next else { break };
            let parts = snapshot?;
            let duration = timer.observe(&parts);
            self.update_entry(entry_id, |entry| {
                entry.parts = parts.clone();
                if duration.is_some() {
                    entry.thinking_duration_secs = duration;
                }
            });
            last = parts;
        }

        if cancel.is_cancelled() {
            return Err(nana_ai::Error::Aborted);
        }
        if let Some(duration) = timer.finish() {
            self.update_entry(entry_id, |entry| {
                entry.thinking_duration_secs = Some(duration);
            });
        }
        Ok(last)
    }

    async fn generate_batch(
        &self,
        request: &GenerationRequest,
        entry_id: &str,
        cancel: &CancellationToken,
    ) -> nana_ai::Result<Vec<Part>> {
        let started = Instant::now();
        let result = cancellable(cancel, self.client.generate(request, cancel.clone())).await?;
        let duration = ThinkingTimer::batch_duration(&result.parts, started.elapsed());
        self.update_entry(entry_id, |entry| {
            entry.parts = result.parts.clone();
            entry.thinking_duration_secs = duration;
        });
        Ok(result.parts)
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    fn require_api_key(&self) -> Result<()> {
        if self.settings.has_api_key() {
            return Ok(());
        }
        self.notify("Please set an API key first", Severity::Error);
        self.emit(PipelineEvent::ApiKeyRequired);
        Err(Error::MissingApiKey)
    }

    pub(crate) fn append(&self, entry: ConversationEntry) {
        self.conversation.write(|c| c.push(entry.clone()));
        self.emit(PipelineEvent::EntryAppended { entry });
    }

    pub(crate) fn update_entry(&self, id: &str, edit: impl FnOnce(&mut ConversationEntry)) {
        match self.conversation.write(|c| c.update(id, edit)) {
            Some(entry) => self.emit(PipelineEvent::EntryUpdated { entry }),
            None => tracing::warn!(entry = %id, "placeholder vanished before update"),
        }
    }

    pub(crate) fn set_progress(&self, completed: usize, total: usize) {
        *self.handle.progress.lock() = Progress::new(completed, total);
        self.emit(PipelineEvent::Progress { completed, total });
    }

    pub(crate) fn set_task_status(
        &self,
        index: usize,
        task: &mut TaskDefinition,
        status: TaskStatus,
        error: Option<String>,
    ) {
        task.status = status;
        task.error = error;
        self.emit(PipelineEvent::TaskStatus {
            index,
            task_id: task.id.clone(),
            status,
        });
    }

    /// Hand every non-reasoning image to the image sink. Returns the count.
    pub(crate) fn record_images(&self, prompt: &str, model: &str, parts: &[Part]) -> usize {
        let label = if prompt.trim().is_empty() {
            UNTITLED_PROMPT
        } else {
            prompt
        };
        let timestamp = chrono::Utc::now().timestamp_millis();
        let mut count = 0;
        for (mime_type, data) in parts.iter().filter_map(Part::as_image) {
            self.collab.images.record(GeneratedImage {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
                prompt: label.to_string(),
                model: model.to_string(),
                timestamp,
            });
            count += 1;
        }
        count
    }
}

fn validate_attachments(attachments: &[Attachment]) -> Result<()> {
    if attachments.len() > MAX_ATTACHMENTS {
        return Err(Error::Validation(format!(
            "at most {} images can be attached, got {}",
            MAX_ATTACHMENTS,
            attachments.len()
        )));
    }
    Ok(())
}

fn validate_pipeline(
    mode: PipelineMode,
    steps: &[TaskDefinition],
    attachments: &[Attachment],
) -> Result<()> {
    validate_attachments(attachments)?;
    if steps.is_empty() {
        return Err(Error::Validation("pipeline needs at least one step".into()));
    }
    if let Some(index) = steps.iter().position(|s| s.prompt.trim().is_empty()) {
        return Err(Error::Validation(format!("step {} has an empty prompt", index + 1)));
    }
    if mode == PipelineMode::Combination && attachments.is_empty() {
        return Err(Error::Validation(
            "combination mode needs at least one input image".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        MockClient, Reply, harness, harness_configured, harness_with, image_of,
    };
    use nana_ai::Role;

    #[tokio::test]
    async fn test_single_send_streams_into_placeholder() {
        let client = MockClient::new().on(
            "a cat",
            Reply::Snapshots(vec![
                vec![Part::thinking("sketching")],
                vec![Part::thinking("sketching"), image_of("cat")],
            ]),
        );
        let h = harness(client);

        let summary = h.orch.send("a cat", vec![], 1).await.unwrap();
        assert_eq!(summary.mode, RunMode::Single);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.images, 1);

        let entries = h.orch.conversation().snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, Role::User);
        assert_eq!(entries[0].parts, vec![Part::text("a cat")]);
        assert_eq!(entries[1].parts.len(), 2);
        assert!(entries[1].thinking_duration_secs.is_some());
        assert!(!entries[1].is_error);

        let recorded = h.images.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].prompt, "a cat");
        assert_eq!(h.balance.count(), 1);
        assert!(!h.orch.handle().is_busy());
    }

    #[tokio::test]
    async fn test_batch_mode_sets_parts_once() {
        let client = MockClient::new().on(
            "think",
            Reply::Parts(vec![Part::thinking("hm"), Part::text("done")]),
        );
        let h = harness_with(client, false);

        h.orch.send("think", vec![], 1).await.unwrap();
        let model = h.orch.conversation().snapshot().pop().unwrap();
        assert_eq!(model.parts, vec![Part::thinking("hm"), Part::text("done")]);
        assert!(model.thinking_duration_secs.is_some());
    }

    #[tokio::test]
    async fn test_empty_prompt_recorded_with_fallback_label() {
        let h = harness(MockClient::new());
        let input = Attachment::new(b"seed".to_vec(), "image/png");
        h.orch.send("", vec![input], 1).await.unwrap();

        let entries = h.orch.conversation().snapshot();
        assert_eq!(entries[0].parts.len(), 1);
        assert!(entries[0].first_text().is_none());
        assert_eq!(h.images.recorded()[0].prompt, UNTITLED_PROMPT);
    }

    #[tokio::test]
    async fn test_failure_becomes_error_entry() {
        let client = MockClient::new().on("x", Reply::Api(429, "quota".into()));
        let h = harness(client);

        let summary = h.orch.send("x", vec![], 1).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.tasks[0].status, TaskStatus::Error);

        let model = h.orch.conversation().snapshot().pop().unwrap();
        assert!(model.is_error);
        assert_eq!(model.parts.len(), 1);
        assert!(model.first_text().unwrap().starts_with("Error: "));
        assert_eq!(h.balance.count(), 1);
        assert!(!h.orch.handle().is_busy());

        // error entries never reach the next request
        h.orch.send("y", vec![], 1).await.unwrap();
        let calls = h.client.calls();
        assert_eq!(calls[1].history.len(), 1);
        assert_eq!(calls[1].history[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_stream_error_replaces_partial_output() {
        let client = MockClient::new().on(
            "storm",
            Reply::Broken(
                vec![
                    vec![Part::thinking("plan")],
                    vec![Part::thinking("plan"), Part::text("half")],
                ],
                503,
                "The model is overloaded".into(),
            ),
        );
        let h = harness(client);

        let summary = h.orch.send("storm", vec![], 1).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert!(!summary.cancelled);

        let model = h.orch.conversation().snapshot().pop().unwrap();
        assert!(model.is_error);
        assert_eq!(model.parts.len(), 1);
        assert!(model.first_text().unwrap().starts_with("Error: "));
        assert!(h.images.recorded().is_empty());
        assert!(!h.orch.handle().is_busy());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let h = harness(MockClient::new());
        h.orch.settings().update(|s| s.api_key = None);
        let mut events = h.orch.subscribe();

        let result = h.orch.send("x", vec![], 1).await;
        assert!(matches!(result, Err(Error::MissingApiKey)));
        assert!(h.client.calls().is_empty());
        assert!(h.orch.conversation().is_empty());
        assert_eq!(h.notes.with_severity(Severity::Error).len(), 1);
        assert!(matches!(events.try_recv(), Ok(PipelineEvent::ApiKeyRequired)));
    }

    #[tokio::test]
    async fn test_too_many_attachments() {
        let h = harness(MockClient::new());
        let inputs = vec![Attachment::new(vec![1], "image/png"); MAX_ATTACHMENTS + 1];
        let result = h.orch.send("x", inputs, 1).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(h.orch.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_keeps_partial_output() {
        let client = MockClient::new().on(
            "slow",
            Reply::Hang(vec![
                vec![Part::thinking("plan")],
                vec![Part::thinking("plan"), Part::text("partial")],
            ]),
        );
        let h = harness(client);
        let mut events = h.orch.subscribe();
        let handle = h.orch.handle();

        let stopper = async {
            while let Ok(event) = events.recv().await {
                if let PipelineEvent::EntryUpdated { entry } = event {
                    if entry.parts.len() == 2 {
                        handle.stop();
                        break;
                    }
                }
            }
        };
        let (summary, _) = tokio::join!(h.orch.send("slow", vec![], 1), stopper);
        let summary = summary.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.failed, 0);
        let model = h.orch.conversation().snapshot().pop().unwrap();
        assert!(!model.is_error);
        assert_eq!(model.parts, vec![Part::thinking("plan"), Part::text("partial")]);
        assert!(h.images.recorded().is_empty());
        assert!(!handle.is_busy());
        assert!(!handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_continues_past_failure() {
        let client = MockClient::new()
            .on("pose", Reply::Parts(vec![image_of("one")]))
            .on("pose", Reply::Network)
            .on("pose", Reply::Parts(vec![image_of("three")]));
        let h = harness(client);
        let mut events = h.orch.subscribe();

        let summary = h.orch.send("pose", vec![], 3).await.unwrap();
        assert_eq!(h.client.calls().len(), 3);
        assert_eq!(summary.mode, RunMode::Repeat);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.images, 2);

        let entries = h.orch.conversation().snapshot();
        assert_eq!(entries.len(), 6);
        assert!(!entries[1].is_error);
        assert!(entries[3].is_error);
        assert!(!entries[5].is_error);

        let errors = h.notes.with_severity(Severity::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Batch task 2 failed"));
        assert_eq!(h.orch.handle().progress(), Progress::default());

        let mut progress = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let PipelineEvent::Progress { completed, total } = event {
                progress.push((completed, total));
            }
        }
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3), (0, 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_waits_between_tasks_only() {
        let config = OrchestratorConfig::default();
        let h = harness_configured(MockClient::new(), true, config.clone());

        let started = Instant::now();
        h.orch.send("pose", vec![], 3).await.unwrap();
        assert_eq!(started.elapsed(), config.repeat_delay * 2);

        let started = Instant::now();
        h.orch.send("pose", vec![], 1).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_count_is_clamped() {
        let h = harness(MockClient::new());
        let summary = h.orch.send("many", vec![], 10).await.unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(h.client.calls().len(), 4);

        let summary = h.orch.send("none", vec![], 0).await.unwrap();
        assert_eq!(summary.mode, RunMode::Single);
    }

    #[tokio::test]
    async fn test_regenerate_truncates_and_resends() {
        let h = harness(MockClient::new());
        let input = Attachment::new(b"seed".to_vec(), "image/png");
        h.orch.send("first", vec![input.clone()], 1).await.unwrap();
        h.orch.send("second", vec![], 1).await.unwrap();

        let model_id = h.orch.conversation().snapshot()[1].id.clone();
        h.orch.regenerate(&model_id).await.unwrap();

        let entries = h.orch.conversation().snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].first_text(), Some("first"));

        let calls = h.client.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].prompt, "first");
        assert_eq!(calls[2].attachments, vec![input]);
        assert!(calls[2].history.is_empty());
    }

    #[tokio::test]
    async fn test_regenerate_unknown_entry() {
        let h = harness(MockClient::new());
        let result = h.orch.regenerate("nope").await;
        assert!(matches!(result, Err(Error::EntryNotFound(_))));
        assert!(!h.orch.handle().is_running());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let h = harness(MockClient::new());
        h.orch.send("x", vec![], 1).await.unwrap();
        let id = h.orch.conversation().snapshot()[0].id.clone();

        h.orch.delete_entry(&id).unwrap();
        assert_eq!(h.orch.conversation().len(), 1);
        assert!(matches!(h.orch.delete_entry(&id), Err(Error::EntryNotFound(_))));

        h.orch.clear_conversation();
        assert!(h.orch.conversation().is_empty());
    }

    #[test]
    fn test_validate_pipeline() {
        let steps = vec![TaskDefinition::new("a")];
        assert!(validate_pipeline(PipelineMode::Serial, &steps, &[]).is_ok());
        assert!(validate_pipeline(PipelineMode::Parallel, &[], &[]).is_err());
        assert!(
            validate_pipeline(PipelineMode::Serial, &[TaskDefinition::new(" ")], &[]).is_err()
        );
        assert!(validate_pipeline(PipelineMode::Combination, &steps, &[]).is_err());
    }
}
