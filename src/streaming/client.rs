//! Completion streaming clients
//!
//! A [`CompletionClient`] issues one request and hands back the raw event
//! sequence. Turning events into a transcript is the consumer's job.
//! - Ollama: POST /api/generate, newline-delimited JSON
//! - OpenAI-compatible: POST /v1/chat/completions, server-sent events (see `openai`)

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use crate::errors::{RagError, Result};
use crate::streaming::parser::{FrameDecoder, NdjsonDecoder, StreamEvent};

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default Ollama model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

/// Request timeout (2 minutes); generation streams for a while
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Raw event sequence from one completion request
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// One generation request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            max_tokens,
        }
    }
}

/// A language-model service that streams its answer
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Open the stream. Failing to establish the request is an error;
    /// failures after that arrive as [`StreamEvent::TransportFault`].
    async fn stream_completion(&self, request: &CompletionRequest) -> Result<EventStream>;

    /// Model identifier the client generates with
    fn model(&self) -> &str;

    /// Check if the service is reachable
    async fn health_check(&self) -> Result<bool>;
}

struct FrameState<S, D> {
    bytes: Pin<Box<S>>,
    decoder: D,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

/// Frame a byte stream into events with the given decoder. A transport
/// error ends the sequence with a single [`StreamEvent::TransportFault`].
pub fn frame_events<S, E, D>(bytes: S, decoder: D) -> EventStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    D: FrameDecoder + Send + 'static,
{
    let state = FrameState {
        bytes: Box::pin(bytes),
        decoder,
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(&chunk);
                    if events.iter().any(|e| matches!(e, StreamEvent::TransportFault(_))) {
                        state.finished = true;
                    }
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    state.pending.push_back(StreamEvent::TransportFault(e.to_string()));
                }
                None => {
                    state.finished = true;
                    let events = state.decoder.finish();
                    state.pending.extend(events);
                }
            }
        }
    }))
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(RagError::HttpError)
}

/// Map a failure to send a completion request; a request that outlived
/// `timeout` is reported as such
pub(crate) fn send_failure(e: reqwest::Error, timeout: Duration) -> RagError {
    if e.is_timeout() {
        RagError::Timeout {
            duration_ms: timeout.as_millis() as u64,
        }
    } else {
        RagError::StreamTransport(format!("Failed to send request: {}", e))
    }
}

/// Ollama streaming client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    timeout: Duration,
    base_url: String,
    model: String,
}

impl OllamaClient {
    /// Create new Ollama client with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_OLLAMA_URL, DEFAULT_MODEL)
    }

    /// Create Ollama client with custom configuration
    pub fn with_config(base_url: &str, model: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(REQUEST_TIMEOUT)?,
            timeout: REQUEST_TIMEOUT,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Replace the whole-request timeout, which also bounds the answer stream
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = http_client(timeout)?;
        self.timeout = timeout;
        Ok(self)
    }

    fn generate_request(&self, request: &CompletionRequest) -> OllamaGenerateRequest {
        OllamaGenerateRequest {
            model: self.model.clone(),
            prompt: request.prompt.clone(),
            stream: true,
            options: Some(OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            }),
        }
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RagError::StreamTransport(format!("Failed to list models: {}", e)))?;

        if !response.status().is_success() {
            return Err(RagError::StreamTransport(
                "Failed to retrieve model list".to_string(),
            ));
        }

        let models_response: ModelsResponse = response.json().await?;

        Ok(models_response
            .models
            .into_iter()
            .map(|m| m.name)
            .collect())
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    async fn stream_completion(&self, request: &CompletionRequest) -> Result<EventStream> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&self.generate_request(request))
            .send()
            .await
            .map_err(|e| send_failure(e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::StreamTransport(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        Ok(frame_events(response.bytes_stream(), NdjsonDecoder::new()))
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/version", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

/// Ollama generate request
#[derive(Debug, Clone, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: usize,
}

/// Ollama models list response
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}
