//! Gemini `generateContent` image provider

use crate::{
    client::{GenerationClient, GenerationRequest, GenerationResult, cancellable},
    error::{Error, Result},
    stream::{PartAccumulator, SnapshotStream},
    types::{Part, Turn, base_url},
};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Finish reasons that mean the candidate was withheld
const SAFETY_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "PROHIBITED_CONTENT",
    "IMAGE_SAFETY",
    "BLOCKLIST",
    "SPII",
];

/// Gemini generative language client
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    /// Create a new client; `endpoint` overrides the default base URL
    pub fn new(api_key: impl Into<String>, endpoint: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url(endpoint),
        }
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|e| Error::InvalidConfig(format!("API key is not a valid header: {}", e)))?;
        headers.insert("x-goog-api-key", key);
        Ok(headers)
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<GenerationResult> {
        let body = build_request(request);
        let url = self.url(&request.config.model, "generateContent");
        let headers = self.headers()?;
        tracing::debug!(model = %request.config.model, "gemini generateContent");

        let call = async {
            let response = self.client.post(&url).headers(headers).json(&body).send().await?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(Error::from_status(status.as_u16(), error_message(&text)));
            }
            let parsed: GeminiResponse = response.json().await?;
            parse_response(parsed)
        };

        cancellable(&cancel, call).await
    }

    async fn stream(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<SnapshotStream> {
        let body = build_request(request);
        let url = format!(
            "{}?alt=sse",
            self.url(&request.config.model, "streamGenerateContent")
        );
        tracing::debug!(model = %request.config.model, "gemini streamGenerateContent");

        let builder = self.client.post(&url).headers(self.headers()?).json(&body);
        let event_source = EventSource::new(builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source, cancel)))
    }
}

fn create_stream(
    mut event_source: EventSource,
    cancel: CancellationToken,
) -> impl futures::Stream<Item = Result<Vec<Part>>> {
    stream! {
        let mut acc = PartAccumulator::new();
        let mut finish_reason: Option<String> = None;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    event_source.close();
                    return;
                }
                event = event_source.next() => event,
            };

            let Some(event) = event else { break };

            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data.is_empty() || msg.data == "[DONE]" {
                        continue;
                    }

                    match apply_chunk(&mut acc, &mut finish_reason, &msg.data) {
                        Ok(true) => yield Ok(acc.parts().to_vec()),
                        Ok(false) => {}
                        Err(e) => {
                            event_source.close();
                            yield Err(e);
                            return;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    event_source.close();
                    let text = response.text().await.unwrap_or_default();
                    yield Err(Error::from_status(status.as_u16(), error_message(&text)));
                    return;
                }
                Err(e) => {
                    event_source.close();
                    yield Err(Error::Sse(e.to_string()));
                    return;
                }
            }
        }

        event_source.close();
        if acc.is_empty() {
            match finish_reason {
                Some(reason) if is_safety_reason(&reason) => yield Err(Error::SafetyBlocked(reason)),
                _ => yield Err(Error::NoContent),
            }
        }
    }
}

/// Merge one SSE payload into the running snapshot.
///
/// Returns whether the snapshot changed. Error payloads and prompt blocks
/// end the stream.
fn apply_chunk(
    acc: &mut PartAccumulator,
    finish_reason: &mut Option<String>,
    data: &str,
) -> Result<bool> {
    let response: GeminiResponse = serde_json::from_str(data)
        .map_err(|e| Error::UnexpectedResponse(format!("Failed to parse chunk: {}", e)))?;
    if let Some(error) = response.error {
        return Err(error.into_error());
    }
    if let Some(reason) = response.block_reason() {
        return Err(Error::SafetyBlocked(reason));
    }
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok(false);
    };
    if let Some(reason) = candidate.finish_reason.clone() {
        *finish_reason = Some(reason);
    }
    apply_candidate(acc, candidate);
    Ok(true)
}

fn is_safety_reason(reason: &str) -> bool {
    SAFETY_FINISH_REASONS.contains(&reason)
}

fn apply_candidate(acc: &mut PartAccumulator, candidate: GeminiCandidate) {
    let Some(content) = candidate.content else {
        return;
    };
    for part in content.parts {
        let reasoning = part.thought.unwrap_or(false);
        if let Some(text) = part.text {
            acc.push_text(&text, reasoning);
        } else if let Some(inline) = part.inline_data {
            acc.push_image(
                inline.mime_type.as_deref(),
                inline.data.as_deref().unwrap_or_default(),
                reasoning,
            );
        }
    }
}

fn parse_response(response: GeminiResponse) -> Result<GenerationResult> {
    if let Some(error) = response.error {
        return Err(error.into_error());
    }
    if let Some(reason) = response.block_reason() {
        return Err(Error::SafetyBlocked(reason));
    }
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(Error::NoContent)?;

    let finish_reason = candidate.finish_reason.clone();
    let mut acc = PartAccumulator::new();
    apply_candidate(&mut acc, candidate);

    if acc.is_empty() {
        return match finish_reason {
            Some(reason) if is_safety_reason(&reason) => Err(Error::SafetyBlocked(reason)),
            _ => Err(Error::NoContent),
        };
    }
    Ok(GenerationResult::new(acc.into_parts()))
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<GeminiErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

fn build_request(request: &GenerationRequest) -> GeminiRequest {
    let contents = request
        .contents()
        .iter()
        .filter_map(convert_turn)
        .collect();

    let config = &request.config;
    let tools = if config.grounding {
        vec![GeminiTool {
            google_search: serde_json::json!({}),
        }]
    } else {
        vec![]
    };

    GeminiRequest {
        contents,
        tools,
        generation_config: GeminiGenerationConfig {
            response_modalities: vec!["TEXT", "IMAGE"],
            image_config: GeminiImageConfig {
                image_size: config.resolution.as_str(),
                aspect_ratio: config.aspect_ratio.ratio(),
            },
            thinking_config: config.thinking.then_some(GeminiThinkingConfig {
                include_thoughts: true,
            }),
        },
    }
}

fn convert_turn(turn: &Turn) -> Option<GeminiContent> {
    let parts: Vec<GeminiPart> = turn
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } => Some(GeminiPart::Text { text: text.clone() }),
            Part::Image {
                mime_type, data, ..
            } => Some(GeminiPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                },
            }),
            // Reasoning is never replayed
            Part::Thinking { .. } | Part::ThinkingImage { .. } => None,
        })
        .collect();

    if parts.is_empty() {
        return None;
    }
    Some(GeminiContent {
        role: turn.role.as_str(),
        parts,
    })
}

// Request types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    google_search: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_modalities: Vec<&'static str>,
    image_config: GeminiImageConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<GeminiThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiImageConfig {
    image_size: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiThinkingConfig {
    include_thoughts: bool,
}

// Response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
    #[serde(default)]
    error: Option<GeminiError>,
}

impl GeminiResponse {
    fn block_reason(&self) -> Option<String> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponsePart {
    text: Option<String>,
    inline_data: Option<GeminiResponseInlineData>,
    thought: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponseInlineData {
    mime_type: Option<String>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    code: Option<u16>,
    message: String,
}

impl GeminiError {
    fn into_error(self) -> Error {
        Error::from_status(self.code.unwrap_or(500), self.message)
    }
}
