//! OpenAI-compatible chat completion streaming
//!
//! POST /v1/chat/completions with `stream: true`. The answer comes back as
//! server-sent events, one `data:` line per delta, terminated by `[DONE]`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::errors::{RagError, Result};
use crate::streaming::client::{
    frame_events, http_client, send_failure, CompletionClient, CompletionRequest, EventStream, REQUEST_TIMEOUT,
};
use crate::streaming::parser::SseDecoder;

/// Default OpenAI API endpoint
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Default chat model
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo-0613";

/// Default system message
pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful assistant.";

/// OpenAI-compatible streaming client
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    timeout: Duration,
    base_url: String,
    model: String,
    api_key: Option<String>,
    system_message: String,
}

impl OpenAiClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_config(DEFAULT_OPENAI_URL, DEFAULT_OPENAI_MODEL, api_key)
    }

    pub fn with_config(base_url: &str, model: &str, api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(REQUEST_TIMEOUT)?,
            timeout: REQUEST_TIMEOUT,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
        })
    }

    /// Replace the whole-request timeout, which also bounds the answer stream
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = http_client(timeout)?;
        self.timeout = timeout;
        Ok(self)
    }

    /// Replace the system message sent ahead of every prompt
    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = system_message.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_request<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_message,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn stream_completion(&self, request: &CompletionRequest) -> Result<EventStream> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .authorized(self.client.post(&url))
            .json(&self.chat_request(request))
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

        Ok(frame_events(response.bytes_stream(), SseDecoder::new()))
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/v1/models", self.base_url);

        match self.authorized(self.client.get(&url)).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OpenAiClient::new(Some("sk-test".to_string())).unwrap();
        assert_eq!(client.model(), DEFAULT_OPENAI_MODEL);
        assert_eq!(client.base_url(), DEFAULT_OPENAI_URL);
    }

    #[test]
    fn test_chat_request_shape() {
        let client = OpenAiClient::with_config("http://localhost:8000/", "gpt-4", None)
            .unwrap()
            .with_system_message("Answer briefly.");
        let request = CompletionRequest::new("What is focus?", 1.0, 350);
        let body = serde_json::to_value(client.chat_request(&request)).unwrap();

        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 350);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "Answer briefly.");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "What is focus?");
    }
}
