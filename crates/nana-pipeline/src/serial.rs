//! Serial pipelines: each step consumes the images the previous step produced.

use nana_ai::{Attachment, Part};

use crate::collab::Severity;
use crate::error::{Error, Result};
use crate::events::PipelineEvent;
use crate::orchestrator::{Orchestrator, TaskOutcome};
use crate::task::{RunMode, RunSummary, TaskDefinition, TaskStatus};

impl Orchestrator {
    pub(crate) async fn run_serial(
        &self,
        mut steps: Vec<TaskDefinition>,
        seed: Vec<Attachment>,
    ) -> Result<RunSummary> {
        let total = steps.len();
        let mut summary = RunSummary::new(RunMode::Serial, total);
        self.emit(PipelineEvent::RunStart {
            mode: RunMode::Serial,
            total,
        });
        self.notify(
            &format!("Starting serial pipeline: {} steps", total),
            Severity::Info,
        );

        let mut current = seed;
        let mut failure = None;

        for index in 0..total {
            let step = index + 1;
            self.set_progress(step, total);
            self.set_task_status(index, &mut steps[index], TaskStatus::Running, None);

            let outcome = {
                let _model = self
                    .settings
                    .override_model(steps[index].model_override.as_deref());
                self.execute_task(&steps[index].prompt, &current).await
            };

            match outcome {
                TaskOutcome::Completed { entry_id, images } => {
                    summary.completed += 1;
                    summary.images += images;
                    self.set_task_status(index, &mut steps[index], TaskStatus::Completed, None);

                    tokio::time::sleep(self.config.settle_delay).await;
                    let produced = self.read_back_images(&entry_id);
                    if produced.is_empty() {
                        tracing::info!(step, "step produced no image, keeping inputs");
                        self.notify(
                            &format!("Step {} produced no image, continuing with its inputs", step),
                            Severity::Info,
                        );
                    } else {
                        current = produced;
                    }
                }
                TaskOutcome::Cancelled => {
                    tracing::info!(step, "serial pipeline stopped");
                    summary.cancelled = true;
                    self.set_task_status(index, &mut steps[index], TaskStatus::Pending, None);
                    break;
                }
                TaskOutcome::Failed { error } => {
                    let message = error.user_message();
                    summary.failed += 1;
                    self.notify(
                        &format!("Step {} failed, pipeline stopped", step),
                        Severity::Error,
                    );
                    self.set_task_status(
                        index,
                        &mut steps[index],
                        TaskStatus::Error,
                        Some(message.clone()),
                    );
                    failure = Some(Error::StepFailed { step, message });
                    break;
                }
            }

            if step < total {
                tokio::time::sleep(self.config.step_delay).await;
            }
        }

        self.set_progress(0, 0);
        summary.tasks = steps;
        self.emit(PipelineEvent::RunEnd {
            summary: summary.clone(),
        });

        match failure {
            Some(error) => Err(error),
            None => {
                if !summary.cancelled {
                    self.notify("Serial pipeline finished", Severity::Success);
                }
                Ok(summary)
            }
        }
    }

    /// Images stored on a finished step's model entry, as next-step inputs.
    fn read_back_images(&self, entry_id: &str) -> Vec<Attachment> {
        let Some(entry) = self.conversation.get(entry_id) else {
            tracing::warn!(entry = %entry_id, "step output missing from conversation");
            return Vec::new();
        };
        entry
            .images()
            .filter_map(Part::as_image)
            .filter_map(|(mime_type, data)| match Attachment::from_base64(data, mime_type) {
                Ok(attachment) => Some(attachment),
                Err(e) => {
                    tracing::warn!("skipping undecodable step image: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::task::{PipelineMode, TaskDefinition, TaskStatus};
    use crate::orchestrator::OrchestratorConfig;
    use crate::test_support::{MockClient, Reply, harness, harness_configured, image_of};
    use nana_ai::{Attachment, DEFAULT_MODEL, Part};
    use tokio::time::Instant;

    fn steps(prompts: &[&str]) -> Vec<TaskDefinition> {
        prompts.iter().map(|p| TaskDefinition::new(*p)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_run_in_order_with_growing_history() {
        let h = harness(MockClient::new());
        let summary = h
            .orch
            .run_pipeline(PipelineMode::Serial, steps(&["a", "b", "c"]), vec![])
            .await
            .unwrap();
        assert_eq!(summary.completed, 3);

        let calls = h.client.calls();
        let prompts: Vec<&str> = calls.iter().map(|c| c.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["a", "b", "c"]);

        // each call sees only earlier steps' turns
        assert_eq!(calls[0].history.len(), 0);
        assert_eq!(calls[1].history.len(), 2);
        assert_eq!(calls[2].history.len(), 4);
        assert!(!calls[1].history.iter().any(|t| t.parts.contains(&image_of("b"))));
        assert_eq!(h.orch.conversation().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_after_each_step_and_pause_between_steps() {
        let config = OrchestratorConfig::default();
        let h = harness_configured(MockClient::new(), true, config.clone());

        let started = Instant::now();
        h.orch
            .run_pipeline(PipelineMode::Serial, steps(&["a", "b", "c"]), vec![])
            .await
            .unwrap();
        assert_eq!(
            started.elapsed(),
            config.settle_delay * 3 + config.step_delay * 2
        );

        // a failing step skips its settle and the chain stops at once
        let client = MockClient::new().on("b", Reply::Api(500, "internal".into()));
        let h = harness_configured(client, true, config.clone());
        let started = Instant::now();
        let result = h
            .orch
            .run_pipeline(PipelineMode::Serial, steps(&["a", "b", "c"]), vec![])
            .await;
        assert!(result.is_err());
        assert_eq!(started.elapsed(), config.settle_delay + config.step_delay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_stops_chain() {
        let client = MockClient::new().on("two", Reply::Api(500, "internal".into()));
        let h = harness(client);

        let mut plan = steps(&["one", "two", "three", "four"]);
        plan[1].model_override = Some("other-model".into());
        let result = h.orch.run_pipeline(PipelineMode::Serial, plan, vec![]).await;

        assert!(matches!(result, Err(Error::StepFailed { step: 2, .. })));
        assert_eq!(h.client.calls().len(), 2);
        assert_eq!(h.orch.settings().model_name(), DEFAULT_MODEL);
        assert_eq!(h.orch.handle().progress().total, 0);
        assert!(h.orch.conversation().snapshot()[3].is_error);
        assert!(
            h.notes
                .with_severity(crate::Severity::Error)
                .iter()
                .any(|m| m.contains("Step 2"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_outputs_feed_next_step() {
        let client = MockClient::new()
            .on("split", Reply::Parts(vec![image_of("left"), Part::text("and"), image_of("right")]))
            .on("describe", Reply::Parts(vec![Part::text("no image here")]));
        let h = harness(client);
        let seed = Attachment::new(b"seed".to_vec(), "image/png");

        h.orch
            .run_pipeline(
                PipelineMode::Serial,
                steps(&["split", "describe", "final"]),
                vec![seed.clone()],
            )
            .await
            .unwrap();

        let calls = h.client.calls();
        assert_eq!(calls[0].attachments, vec![seed]);
        let produced = vec![
            Attachment::new(b"left".to_vec(), "image/png"),
            Attachment::new(b"right".to_vec(), "image/png"),
        ];
        assert_eq!(calls[1].attachments, produced);
        // a text-only step passes its own inputs through
        assert_eq!(calls[2].attachments, produced);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_override_applies_per_step() {
        let h = harness(MockClient::new());
        let plan = vec![
            TaskDefinition::new("a").with_model("gpt-image-1.5-all"),
            TaskDefinition::new("b"),
        ];

        let summary = h.orch.run_pipeline(PipelineMode::Serial, plan, vec![]).await.unwrap();
        let calls = h.client.calls();
        assert_eq!(calls[0].config.model, "gpt-image-1.5-all");
        assert_eq!(calls[1].config.model, DEFAULT_MODEL);
        assert_eq!(h.orch.settings().model_name(), DEFAULT_MODEL);
        assert!(summary.tasks.iter().all(|t| t.status == TaskStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_halts_chain() {
        let client = MockClient::new().on("wait", Reply::Hang(vec![vec![Part::text("...")]]));
        let h = harness(client);
        let handle = h.orch.handle();
        let mut events = h.orch.subscribe();

        let stopper = async {
            while let Ok(event) = events.recv().await {
                if matches!(event, crate::PipelineEvent::EntryUpdated { .. }) {
                    handle.stop();
                    break;
                }
            }
        };
        let (result, _) = tokio::join!(
            h.orch
                .run_pipeline(PipelineMode::Serial, steps(&["wait", "never"]), vec![]),
            stopper
        );

        let summary = result.unwrap();
        assert!(summary.cancelled);
        assert_eq!(h.client.calls().len(), 1);
        assert_eq!(summary.tasks[1].status, TaskStatus::Pending);
    }
}
