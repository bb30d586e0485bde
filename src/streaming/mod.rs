//! Streaming completion module
//!
//! Completion clients (Ollama, OpenAI-compatible), incremental framing and
//! the fault-tolerant stream consumer.

pub mod client;
pub mod consumer;
pub mod openai;
pub mod parser;

// Re-export commonly used types
pub use client::{
    frame_events, CompletionClient, CompletionRequest, EventStream, OllamaClient, DEFAULT_MODEL,
    DEFAULT_OLLAMA_URL, REQUEST_TIMEOUT,
};
pub use consumer::{CompletionStream, Interrupted, StreamOutcome};
pub use openai::{OpenAiClient, DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_URL, DEFAULT_SYSTEM_MESSAGE};
pub use parser::{
    decode_ollama_object, decode_openai_line, FrameDecoder, LineBuffer, NdjsonDecoder,
    SkipReason, SseDecoder, StreamEvent, MAX_BUFFER_SIZE,
};
