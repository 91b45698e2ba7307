//! Scripted client and recording collaborators for orchestrator tests

use async_trait::async_trait;
use nana_ai::{
    Attachment, GenerationClient, GenerationRequest, GenerationResult, Part, SnapshotStream,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::collab::{BalanceSource, Collaborators, GeneratedImage, ImageSink, Notifier, Severity};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::settings::{Settings, SettingsStore};

/// Image part whose bytes are the given label
pub(crate) fn image_of(label: &str) -> Part {
    Attachment::new(label.as_bytes().to_vec(), "image/png").to_part()
}

/// Scripted response for one call
pub(crate) enum Reply {
    Parts(Vec<Part>),
    /// Cumulative snapshots; batch calls get the last one
    Snapshots(Vec<Vec<Part>>),
    /// Yield snapshots, then wait until cancelled
    Hang(Vec<Vec<Part>>),
    /// Yield snapshots, then fail with an API error
    Broken(Vec<Vec<Part>>, u16, String),
    Delayed(Duration, Box<Reply>),
    Network,
    Api(u16, String),
}

/// Client that answers from per-prompt reply queues and records requests.
///
/// Prompts without a queued reply get one image whose bytes are the prompt.
#[derive(Default)]
pub(crate) struct MockClient {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl MockClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(self, prompt: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .entry(prompt.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub(crate) fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().clone()
    }

    fn next_reply(&self, request: &GenerationRequest) -> Reply {
        self.calls.lock().push(request.clone());
        self.replies
            .lock()
            .get_mut(&request.prompt)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Reply::Parts(vec![image_of(&request.prompt)]))
    }
}

async fn resolve(reply: Reply, cancel: CancellationToken) -> nana_ai::Result<Vec<Part>> {
    let mut reply = reply;
    loop {
        match reply {
            Reply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
            Reply::Parts(parts) => return Ok(parts),
            Reply::Snapshots(mut snapshots) => return Ok(snapshots.pop().unwrap_or_default()),
            Reply::Hang(_) => {
                cancel.cancelled().await;
                return Err(nana_ai::Error::Aborted);
            }
            Reply::Network => {
                return Err(nana_ai::Error::Sse("connection reset by peer".into()));
            }
            Reply::Api(status, message) | Reply::Broken(_, status, message) => {
                return Err(nana_ai::Error::api(status, message));
            }
        }
    }
}

#[async_trait]
impl GenerationClient for MockClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> nana_ai::Result<GenerationResult> {
        let reply = self.next_reply(request);
        resolve(reply, cancel).await.map(GenerationResult::new)
    }

    async fn stream(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> nana_ai::Result<SnapshotStream> {
        match self.next_reply(request) {
            Reply::Snapshots(snapshots) => Ok(Box::pin(async_stream::stream! {
                for snapshot in snapshots {
                    yield Ok::<_, nana_ai::Error>(snapshot);
                }
            })),
            Reply::Hang(snapshots) => Ok(Box::pin(async_stream::stream! {
                for snapshot in snapshots {
                    yield Ok::<_, nana_ai::Error>(snapshot);
                }
                cancel.cancelled().await;
            })),
            Reply::Broken(snapshots, status, message) => Ok(Box::pin(async_stream::stream! {
                for snapshot in snapshots {
                    yield Ok::<_, nana_ai::Error>(snapshot);
                }
                yield Err(nana_ai::Error::api(status, message));
            })),
            other => {
                let parts = resolve(other, cancel).await?;
                Ok(Box::pin(async_stream::stream! {
                    yield Ok::<_, nana_ai::Error>(parts);
                }))
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    images: Mutex<Vec<GeneratedImage>>,
}

impl RecordingSink {
    pub(crate) fn recorded(&self) -> Vec<GeneratedImage> {
        self.images.lock().clone()
    }
}

impl ImageSink for RecordingSink {
    fn record(&self, image: GeneratedImage) {
        self.images.lock().push(image);
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    messages: Mutex<Vec<(String, Severity)>>,
}

impl RecordingNotifier {
    pub(crate) fn with_severity(&self, severity: Severity) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(_, s)| *s == severity)
            .map(|(m, _)| m.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        self.messages.lock().push((message.to_string(), severity));
    }
}

/// Counts refreshes and always fails, which the orchestrator must ignore
#[derive(Default)]
pub(crate) struct CountingBalance {
    refreshes: AtomicUsize,
}

impl CountingBalance {
    pub(crate) fn count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BalanceSource for CountingBalance {
    async fn refresh(&self) -> nana_ai::Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Err(nana_ai::Error::InvalidApiKey)
    }
}

pub(crate) struct Harness {
    pub orch: Orchestrator,
    pub client: Arc<MockClient>,
    pub images: Arc<RecordingSink>,
    pub notes: Arc<RecordingNotifier>,
    pub balance: Arc<CountingBalance>,
}

/// Orchestrator with streaming on, an API key set and no delays
pub(crate) fn harness(client: MockClient) -> Harness {
    harness_with(client, true)
}

pub(crate) fn harness_with(client: MockClient, stream: bool) -> Harness {
    harness_configured(
        client,
        stream,
        OrchestratorConfig {
            repeat_delay: Duration::ZERO,
            step_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
            max_repeat: 4,
        },
    )
}

pub(crate) fn harness_configured(
    client: MockClient,
    stream: bool,
    config: OrchestratorConfig,
) -> Harness {
    let client = Arc::new(client);
    let images = Arc::new(RecordingSink::default());
    let notes = Arc::new(RecordingNotifier::default());
    let balance = Arc::new(CountingBalance::default());
    let settings = SettingsStore::new(Settings {
        api_key: Some("test-key".into()),
        stream,
        ..Settings::default()
    });
    let collab = Collaborators {
        images: images.clone(),
        notifier: notes.clone(),
        balance: balance.clone(),
    };
    let orch = Orchestrator::new(client.clone(), settings, collab).with_config(config);
    Harness {
        orch,
        client,
        images,
        notes,
        balance,
    }
}
