//! RagBuddy - grounded question answering over a podcast transcript index
//!
//! # Architecture
//!
//! - **Retrieval**: hybrid (vector + keyword) search against Weaviate
//! - **Reranking**: cross-encoder relevance scores with sigmoid calibration
//! - **Context**: tokenizer-backed budget selection of the ranked passages
//! - **Prompt**: template rendering of the selected series
//! - **Streaming**: fault-tolerant consumption of the completion stream
//! - **Interface**: single-question CLI, REPL and diagnostics

pub mod errors;
pub mod types;
pub mod context;
pub mod rag;
pub mod streaming;
pub mod telemetry;

// Re-export commonly used types
pub use errors::{RagError, Result};

// Interface layer
pub mod cli;
pub mod doctor;
pub mod repl;

// Shared execution logic for CLI and REPL
pub mod execution;
