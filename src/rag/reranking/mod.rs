// Reranking: cross-encoder relevance scoring and score calibration
pub mod cross_encoder;
pub mod scorer;

pub use cross_encoder::{CandleCrossEncoder, CrossEncoder, DEFAULT_CROSS_ENCODER};
pub use scorer::{sigmoid, ReRankConfig, ReRanker};
