//! Error types for RagBuddy
//!
//! One error enum for the whole request pipeline. Chunk-level stream faults
//! are absent: they are recovered inside the stream consumer
//! and never surface as errors.

use thiserror::Error;

/// Reranking failures. Only genuinely invalid input ends up here;
/// degenerate scores are normalised instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RerankError {
    /// Nothing was retrieved, so there is nothing to rank
    #[error("cannot rerank an empty candidate set")]
    EmptyCandidates,

    /// `top_k` of zero would always produce an empty ranking
    #[error("top_k must be at least 1")]
    InvalidTopK,

    /// The cross-encoder returned a different number of scores than passages
    #[error("cross-encoder returned {got} scores for {expected} passages")]
    ScoreCountMismatch { expected: usize, got: usize },
}

/// Main error type for the RagBuddy pipeline
#[derive(Error, Debug)]
pub enum RagError {
    /// Search collaborator failures, passed through unmodified
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Reranking errors
    #[error("Rerank error: {0}")]
    Rerank(#[from] RerankError),

    /// Prompt template is missing a required slot
    #[error("Template error: {0}")]
    Template(String),

    /// The completion transport failed or could not be opened
    #[error("Stream transport failed: {0}")]
    StreamTransport(String),

    /// Tokenizer loading or encoding errors
    #[error("Tokenizer error: {0}")]
    TokenizerError(String),

    /// Cross-encoder model loading or inference errors
    #[error("Model error: {0}")]
    ModelError(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Generic errors with context
    #[error("RagBuddy error: {0}")]
    Generic(String),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, RagError>;

/// Convert anyhow errors to RagError
impl From<anyhow::Error> for RagError {
    fn from(err: anyhow::Error) -> Self {
        RagError::Generic(err.to_string())
    }
}

impl From<candle_core::Error> for RagError {
    fn from(err: candle_core::Error) -> Self {
        RagError::ModelError(err.to_string())
    }
}
