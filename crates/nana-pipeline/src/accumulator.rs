//! Bookkeeping for a task's output: reasoning time and fan-out result merging

use nana_ai::Part;
use std::time::Duration;
use tokio::time::Instant;

/// Measures how long the model reasons before it starts answering.
///
/// While the newest part of a snapshot is reasoning the duration keeps
/// growing. It freezes when a non-reasoning part follows.
#[derive(Debug, Clone)]
pub struct ThinkingTimer {
    started: Instant,
    thinking: bool,
}

impl ThinkingTimer {
    pub fn start() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started: Instant) -> Self {
        Self {
            started,
            thinking: false,
        }
    }

    /// Observe a snapshot. Returns the duration to record, or `None` to keep
    /// the recorded value.
    pub fn observe(&mut self, parts: &[Part]) -> Option<f64> {
        self.observe_at(parts, Instant::now())
    }

    pub fn observe_at(&mut self, parts: &[Part], now: Instant) -> Option<f64> {
        match parts.last() {
            Some(part) if part.is_reasoning() => {
                self.thinking = true;
                Some(self.elapsed_secs(now))
            }
            Some(_) => {
                self.thinking = false;
                None
            }
            None => None,
        }
    }

    /// Final duration when the stream ended while still reasoning
    pub fn finish(&mut self) -> Option<f64> {
        self.finish_at(Instant::now())
    }

    pub fn finish_at(&mut self, now: Instant) -> Option<f64> {
        if std::mem::take(&mut self.thinking) {
            Some(self.elapsed_secs(now))
        } else {
            None
        }
    }

    fn elapsed_secs(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.started).as_secs_f64()
    }

    /// Duration for a non-streamed result: the whole call, if the result
    /// contains any reasoning.
    pub fn batch_duration(parts: &[Part], elapsed: Duration) -> Option<f64> {
        parts
            .iter()
            .any(Part::is_reasoning)
            .then(|| elapsed.as_secs_f64())
    }
}

/// Merges fan-out task results into one placeholder, in completion order.
#[derive(Debug, Clone, Default)]
pub struct FanOutAccumulator {
    parts: Vec<Part>,
    total: usize,
    completed: usize,
    failed: usize,
    images: usize,
}

impl FanOutAccumulator {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Append a successful result, tagging its images with the prompt.
    pub fn push_success(&mut self, prompt: &str, parts: Vec<Part>) {
        self.completed += 1;
        for part in parts {
            if part.as_image().is_some() {
                self.images += 1;
            }
            self.parts.push(part.with_source_prompt(prompt));
        }
    }

    /// Append a failure marker (`label` is e.g. "Step 2").
    pub fn push_failure(&mut self, label: &str, message: &str) {
        self.completed += 1;
        self.failed += 1;
        self.parts
            .push(Part::text(format!("❌ {} failed: {}", label, message)));
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn images(&self) -> usize {
        self.images
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
