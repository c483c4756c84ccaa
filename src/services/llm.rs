//! OpenAI-compatible chat completions client.
//!
//! Two call shapes are used: a single JSON-mode completion (generation and
//! grading) and a token stream (explanations). Prompts and images are never
//! logged; model, purpose, sizes and latency are.

use std::pin::Pin;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::AiSettings;
use crate::core::metrics;

pub(crate) type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[derive(Debug, Error)]
pub(crate) enum LlmError {
    #[error("failed to reach completion API: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("completion response has no message content")]
    MissingContent,
    #[error("malformed stream event: {0}")]
    MalformedEvent(String),
}

#[async_trait]
pub(crate) trait CompletionClient: Send + Sync {
    /// Runs one non-streaming completion and returns the assistant text.
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError>;

    /// Opens a streaming completion. Each item is one non-empty content delta.
    async fn stream(&self, request: ChatRequest) -> Result<FragmentStream, LlmError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Purpose {
    Generation,
    Grading,
    Explanation,
}

impl Purpose {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Generation => "generation",
            Self::Grading => "grading",
            Self::Explanation => "explanation",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChatRequest {
    pub(crate) purpose: Purpose,
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) json_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ChatMessage {
    pub(crate) role: Role,
    pub(crate) content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub(crate) enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ImageUrl {
    pub(crate) url: String,
}

impl ChatMessage {
    pub(crate) fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: MessageContent::Text(content.into()) }
    }

    pub(crate) fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: MessageContent::Text(content.into()) }
    }

    pub(crate) fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self { role: Role::User, content: MessageContent::Parts(parts) }
    }
}

impl ContentPart {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub(crate) fn jpeg_base64(encoded: &str) -> Self {
        Self::ImageUrl { image_url: ImageUrl { url: format!("data:image/jpeg;base64,{encoded}") } }
    }
}

#[derive(Serialize)]
struct CompletionPayload<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    generation_model: String,
    grading_model: String,
    explanation_model: String,
}

impl OpenAiClient {
    pub(crate) fn from_settings(ai: &AiSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(ai.request_timeout))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: ai.openai_api_key.clone(),
            base_url: ai.openai_base_url.trim_end_matches('/').to_string(),
            generation_model: ai.generation_model.clone(),
            grading_model: ai.grading_model.clone(),
            explanation_model: ai.explanation_model.clone(),
        })
    }

    fn model_for(&self, purpose: Purpose) -> &str {
        match purpose {
            Purpose::Generation => &self.generation_model,
            Purpose::Grading => &self.grading_model,
            Purpose::Explanation => &self.explanation_model,
        }
    }

    async fn send(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let payload = CompletionPayload {
            model: self.model_for(request.purpose),
            messages: &request.messages,
            response_format: request.json_mode.then_some(ResponseFormat { kind: "json_object" }),
            stream,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), body });
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        let purpose = request.purpose.as_str();
        let timer = Instant::now();
        tracing::info!(
            purpose,
            model = self.model_for(request.purpose),
            messages = request.messages.len(),
            "Sending completion request"
        );

        let outcome = async {
            let body: CompletionResponse = self.send(&request, false).await?.json().await?;
            let tokens_used = body.usage.and_then(|usage| usage.total_tokens);
            let content = body
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .ok_or(LlmError::MissingContent)?;
            Ok::<_, LlmError>((content, tokens_used))
        }
        .await;

        match outcome {
            Ok((content, tokens_used)) => {
                metrics::record_llm_call(purpose, "ok");
                tracing::info!(
                    purpose,
                    duration_seconds = timer.elapsed().as_secs_f64(),
                    tokens_used,
                    response_chars = content.len(),
                    "Completion finished"
                );
                Ok(content)
            }
            Err(err) => {
                metrics::record_llm_call(purpose, "error");
                tracing::error!(purpose, error = %err, "Completion failed");
                Err(err)
            }
        }
    }

    async fn stream(&self, request: ChatRequest) -> Result<FragmentStream, LlmError> {
        let purpose = request.purpose.as_str();
        tracing::info!(
            purpose,
            model = self.model_for(request.purpose),
            "Opening streaming completion"
        );

        let response = match self.send(&request, true).await {
            Ok(response) => response,
            Err(err) => {
                metrics::record_llm_call(purpose, "error");
                return Err(err);
            }
        };
        metrics::record_llm_call(purpose, "ok");

        Ok(decode_event_stream(response.bytes_stream()))
    }
}

/// Turns the raw `text/event-stream` body of a streaming completion into
/// content fragments. Chunk boundaries may fall anywhere, including inside a
/// multi-byte character.
pub(crate) fn decode_event_stream<S, B>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    Box::pin(event_fragments(body))
}

fn event_fragments<S, B>(body: S) -> impl Stream<Item = Result<String, LlmError>> + Send
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    async_stream::try_stream! {
        let mut body = Box::pin(body);
        let mut lines = EventLineBuffer::default();

        'events: while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for line in lines.push(chunk.as_ref()) {
                match parse_event_line(&line)? {
                    EventLine::Fragment(text) => yield text,
                    EventLine::Done => break 'events,
                    EventLine::Ignored => {}
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct EventLineBuffer {
    pending: Vec<u8>,
}

impl EventLineBuffer {
    /// Appends bytes and drains every complete line, without its terminator.
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(position) = self.pending.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=position).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

#[derive(Debug, PartialEq, Eq)]
enum EventLine {
    Fragment(String),
    Done,
    Ignored,
}

fn parse_event_line(line: &str) -> Result<EventLine, LlmError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(EventLine::Ignored);
    };
    let data = data.strip_prefix(' ').unwrap_or(data);

    if data == "[DONE]" {
        return Ok(EventLine::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|err| LlmError::MalformedEvent(format!("{err}: {}", truncate(data, 120))))?;

    let fragment = chunk.choices.into_iter().next().and_then(|choice| choice.delta.content);
    Ok(match fragment {
        Some(text) if !text.is_empty() => EventLine::Fragment(text),
        _ => EventLine::Ignored,
    })
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
