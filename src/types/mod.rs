//! Type definitions module
//!
//! Request-scoped records that flow through the retrieval pipeline.

pub mod hits;

// Re-export commonly used types
pub use hits::{format_duration, CitationEntry, Cited, RankedHit, SearchHit};
