//! Streaming client for OpenAI-compatible `/chat/completions` endpoints.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

use crate::config::Config;
use crate::constants::CONNECT_TIMEOUT_SECS;
use crate::error::GatewayError;
use crate::history::Message;
use crate::prompts::PromptKind;

/// Text fragments of one reply, in arrival order. Single pass.
pub type FragmentStream = BoxStream<'static, Result<String, GatewayError>>;

#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn stream_completion(
        &self,
        transcript: &[Message],
        kind: PromptKind,
    ) -> Result<FragmentStream, GatewayError>;
}

/// System prompt for `kind` followed by the transcript.
pub fn build_messages(transcript: &[Message], kind: PromptKind) -> Vec<Message> {
    let mut messages = Vec::with_capacity(transcript.len() + 1);
    messages.push(Message::system(kind.system_prompt()));
    messages.extend_from_slice(transcript);
    messages
}

/// Drains `stream`, handing each fragment to `on_fragment`, and returns the
/// full text.
pub async fn collect_fragments<F>(mut stream: FragmentStream, mut on_fragment: F) -> Result<String, GatewayError>
where
    F: FnMut(&str),
{
    let mut reply = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        on_fragment(&fragment);
        reply.push_str(&fragment);
    }
    Ok(reply)
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

pub struct OpenAiGateway {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGateway {
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionGateway for OpenAiGateway {
    #[instrument(skip(self, transcript), fields(model = %self.model, messages = transcript.len()))]
    async fn stream_completion(
        &self,
        transcript: &[Message],
        kind: PromptKind,
    ) -> Result<FragmentStream, GatewayError> {
        let messages = build_messages(transcript, kind);
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: &messages,
            stream: true,
        };
        let url = self.endpoint();
        debug!(%url, "Sending streaming completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = provider_error_message(&body).unwrap_or(body);
            error!(%status, %message, "Completion request rejected");
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Auth {
                    status: status.as_u16(),
                    message,
                },
                _ => GatewayError::Provider {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let mut body = Box::pin(response.bytes_stream());
        let stream = try_stream! {
            let mut decoder = SseDecoder::default();
            let mut done = false;
            while !done {
                let Some(chunk) = body.next().await else { break };
                let chunk = chunk.map_err(GatewayError::from)?;
                for event in decoder.push(&chunk)? {
                    match event {
                        SseEvent::Fragment(text) => yield text,
                        SseEvent::Done => {
                            done = true;
                            break;
                        }
                    }
                }
            }
            if !done {
                for event in decoder.finish()? {
                    if let SseEvent::Fragment(text) = event {
                        yield text;
                    }
                }
            }
        };
        Ok(stream.boxed())
    }
}

/// `error.message` from a provider's JSON error body, if there is one.
fn provider_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value["error"]["message"].as_str().map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Fragment(String),
    Done,
}

/// Incremental decoder for the `data:` lines of a completion event stream.
/// Chunks may split lines (and multi-byte characters) anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, GatewayError> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(event) = decode_line(&line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Flushes a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Result<Vec<SseEvent>, GatewayError> {
        let line = std::mem::take(&mut self.pending);
        Ok(decode_line(&line)?.into_iter().collect())
    }
}

fn decode_line(raw: &[u8]) -> Result<Option<SseEvent>, GatewayError> {
    let line = std::str::from_utf8(raw)
        .map_err(|e| GatewayError::MalformedResponse(format!("invalid UTF-8 in stream: {}", e)))?;
    let line = line.trim_end_matches(['\r', '\n']);
    // Blank separators, comments and non-data fields carry no text.
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let value: Value = serde_json::from_str(data)
        .map_err(|e| GatewayError::MalformedResponse(format!("{}: {}", e, data)))?;
    if let Some(err) = value.get("error") {
        let message = err["message"].as_str().unwrap_or("unknown error").to_string();
        warn!(%message, "Provider reported an error mid-stream");
        return Err(GatewayError::Provider { status: 200, message });
    }
    match value["choices"][0]["delta"]["content"].as_str() {
        Some(text) if !text.is_empty() => Ok(Some(SseEvent::Fragment(text.to_string()))),
        _ => Ok(None),
    }
}
