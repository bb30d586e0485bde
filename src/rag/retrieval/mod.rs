// Retrieval: the hybrid-search boundary and its Weaviate implementation
pub mod engine;
pub mod weaviate;

pub use engine::{
    FilterOperator, HybridQuery, HybridSearch, RetrievalEngine, SearchParams, WhereFilter,
    DEFAULT_DISPLAY_PROPERTIES,
};
pub use weaviate::WeaviateClient;
