// Retrieval-augmented generation over a hybrid transcript index
//
// Components:
// - Retrieval: hybrid (vector + keyword) search through an injected client
// - Re-ranking: cross-encoder relevance with sigmoid calibration
// - Prompt: template rendering of the selected passages
// - Citations: deduplicated sources for display
// - Pipeline: end-to-end orchestration

pub mod citations;
pub mod pipeline;
pub mod prompt;
pub mod reranking;
pub mod retrieval;

// Re-export key types
pub use citations::{citations, dedupe};
pub use pipeline::{
    EmptyContextPolicy, GroundingContext, PreparedAnswer, QueryParams, RagConfig, RagPipeline,
};
pub use prompt::PromptAssembler;
pub use reranking::ReRanker;
pub use retrieval::RetrievalEngine;
