//! Parallel and combinatorial pipelines: many independent tasks merged into
//! one shared placeholder in completion order.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use nana_ai::{Attachment, GenerationRequest, ModelConfig, Part};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::accumulator::FanOutAccumulator;
use crate::collab::Severity;
use crate::conversation::ConversationEntry;
use crate::events::PipelineEvent;
use crate::history;
use crate::orchestrator::Orchestrator;
use crate::task::{PipelineMode, RunMode, RunSummary, TaskDefinition, TaskStatus};

/// One concurrently running task
struct Job {
    index: usize,
    /// Failure label, e.g. "Step 2" or "Image 1 × Step 3"
    label: String,
    prompt: String,
    attachments: Vec<Attachment>,
    config: ModelConfig,
}

impl Orchestrator {
    pub(crate) async fn run_fan_out(
        &self,
        mode: PipelineMode,
        steps: Vec<TaskDefinition>,
        seed: Vec<Attachment>,
    ) -> RunSummary {
        let settings = self.settings.snapshot();
        let config_for = |step: &TaskDefinition| match &step.model_override {
            Some(model) => settings.model.with_model(model.as_str()),
            None => settings.model.clone(),
        };

        let (mut tasks, jobs): (Vec<TaskDefinition>, Vec<Job>) = match mode {
            PipelineMode::Combination => seed
                .iter()
                .enumerate()
                .flat_map(|(a, attachment)| {
                    steps.iter().enumerate().map(move |(s, step)| (a, attachment, s, step))
                })
                .enumerate()
                .map(|(index, (a, attachment, s, step))| {
                    let mut task = step.clone();
                    task.id = format!("{}-{}", step.id, a + 1);
                    let job = Job {
                        index,
                        label: format!("Image {} × Step {}", a + 1, s + 1),
                        prompt: step.prompt.clone(),
                        attachments: vec![attachment.clone()],
                        config: config_for(step),
                    };
                    (task, job)
                })
                .unzip(),
            PipelineMode::Parallel | PipelineMode::Serial => steps
                .iter()
                .enumerate()
                .map(|(index, step)| {
                    let job = Job {
                        index,
                        label: format!("Step {}", index + 1),
                        prompt: step.prompt.clone(),
                        attachments: seed.clone(),
                        config: config_for(step),
                    };
                    (step.clone(), job)
                })
                .unzip(),
        };

        let total = jobs.len();
        let run_mode = RunMode::from(mode);
        let mut summary = RunSummary::new(run_mode, total);
        self.emit(PipelineEvent::RunStart {
            mode: run_mode,
            total,
        });
        self.notify(
            &format!("Starting {} pipeline: {} tasks", mode, total),
            Severity::Info,
        );

        // Every task sees the transcript as it was before this batch.
        let history = self.conversation.read(|c| history::project(c.entries()));

        let mut user_parts: Vec<Part> = seed.iter().map(Attachment::to_part).collect();
        user_parts.push(Part::text(batch_summary(mode, &steps, seed.len(), total)));
        self.append(ConversationEntry::user(user_parts));
        let placeholder = ConversationEntry::placeholder();
        let entry_id = placeholder.id.clone();
        self.append(placeholder);
        self.set_progress(0, total);

        let mut pending = FuturesUnordered::new();
        for job in jobs {
            self.set_task_status(job.index, &mut tasks[job.index], TaskStatus::Running, None);
            let request = GenerationRequest {
                history: history.clone(),
                prompt: job.prompt.clone(),
                attachments: job.attachments.clone(),
                config: job.config.clone(),
            };
            let client = Arc::clone(&self.client);
            pending.push(async move {
                let result = client.generate(&request, CancellationToken::new()).await;
                (job, result)
            });
        }

        let mut acc = FanOutAccumulator::new(total);
        while let Some((job, result)) = pending.next().await {
            match result {
                Ok(result) => {
                    self.record_images(&job.prompt, &job.config.model, &result.parts);
                    acc.push_success(&job.prompt, result.parts);
                    self.set_task_status(job.index, &mut tasks[job.index], TaskStatus::Completed, None);
                }
                Err(e) => {
                    let message = e.user_message();
                    tracing::warn!(task = %job.label, category = e.category().label(), "fan-out task failed: {}", e);
                    acc.push_failure(&job.label, &message);
                    self.set_task_status(
                        job.index,
                        &mut tasks[job.index],
                        TaskStatus::Error,
                        Some(message),
                    );
                }
            }
            let parts = acc.parts().to_vec();
            self.update_entry(&entry_id, |entry| entry.parts = parts);
            self.set_progress(acc.completed(), acc.total());
        }

        self.set_progress(0, 0);
        summary.completed = acc.completed() - acc.failed();
        summary.failed = acc.failed();
        summary.images = acc.images();
        summary.tasks = tasks;

        if let Err(e) = self.collab.balance.refresh().await {
            tracing::debug!("balance refresh failed: {}", e);
        }
        self.notify(
            &format!(
                "{} pipeline finished: {} images from {} tasks",
                capitalize(mode.as_str()),
                summary.images,
                total
            ),
            Severity::Success,
        );
        self.emit(PipelineEvent::RunEnd {
            summary: summary.clone(),
        });
        summary
    }
}

/// Text of the combined user entry
fn batch_summary(mode: PipelineMode, steps: &[TaskDefinition], images: usize, total: usize) -> String {
    let numbered = steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step.prompt))
        .collect::<Vec<_>>()
        .join("\n");
    match mode {
        PipelineMode::Combination => format!(
            "🎨 Combination batch ({} images × {} prompts = {} tasks):\n\n{}",
            images,
            steps.len(),
            total,
            numbered
        ),
        PipelineMode::Parallel | PipelineMode::Serial => format!(
            "🌳 Parallel pipeline ({} tasks):\n\n{}",
            steps.len(),
            numbered
        ),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
