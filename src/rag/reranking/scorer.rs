// Reranking of hybrid-search hits with a cross-encoder and sigmoid calibration
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::{RerankError, Result};
use crate::rag::reranking::cross_encoder::CrossEncoder;
use crate::types::{RankedHit, SearchHit};

/// Re-ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReRankConfig {
    /// Number of hits to keep after sorting
    pub top_k: usize,
    /// Map raw logits into (0, 1) with a sigmoid
    pub apply_calibration: bool,
    /// Drop hits scoring below this (after calibration, if applied)
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Default for ReRankConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            apply_calibration: true,
            min_score: None,
        }
    }
}

/// Re-ranker for hybrid-search results
pub struct ReRanker {
    encoder: Arc<dyn CrossEncoder>,
    config: ReRankConfig,
}

impl ReRanker {
    /// Create new re-ranker with default config
    pub fn new(encoder: Arc<dyn CrossEncoder>) -> Self {
        Self::with_config(encoder, ReRankConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(encoder: Arc<dyn CrossEncoder>, config: ReRankConfig) -> Self {
        Self { encoder, config }
    }

    /// Re-rank with the configured `top_k` and calibration
    pub fn rerank(&self, hits: Vec<SearchHit>, query: &str) -> Result<Vec<RankedHit>> {
        self.rerank_with(hits, query, self.config.top_k, self.config.apply_calibration)
    }

    /// Score every hit against `query`, sort descending and keep `top_k`
    ///
    /// Ties keep their retrieval order. A `NaN` score ranks below every
    /// real score instead of failing the request.
    pub fn rerank_with(
        &self,
        hits: Vec<SearchHit>,
        query: &str,
        top_k: usize,
        apply_calibration: bool,
    ) -> Result<Vec<RankedHit>> {
        if hits.is_empty() {
            return Err(RerankError::EmptyCandidates.into());
        }
        if top_k == 0 {
            return Err(RerankError::InvalidTopK.into());
        }

        let passages: Vec<&str> = hits.iter().map(|h| h.content.as_str()).collect();
        let raw_scores = self.encoder.score(query, &passages)?;
        if raw_scores.len() != hits.len() {
            return Err(RerankError::ScoreCountMismatch {
                expected: hits.len(),
                got: raw_scores.len(),
            }
            .into());
        }

        let degenerate = raw_scores.iter().filter(|s| s.is_nan()).count();
        if degenerate > 0 {
            tracing::warn!(degenerate, model = self.encoder.model_id(), "cross-encoder produced NaN scores");
        }

        // Order on raw scores: the sigmoid saturates in f32 and would
        // otherwise collapse distinct large logits into ties.
        let mut scored: Vec<(SearchHit, f32)> = hits
            .into_iter()
            .zip(raw_scores.into_iter().map(sanitize))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let ranked: Vec<RankedHit> = scored
            .into_iter()
            .map(|(hit, raw)| {
                let rerank_score = if apply_calibration { sigmoid(raw) } else { raw };
                (hit, rerank_score)
            })
            .filter(|(_, score)| self.config.min_score.map_or(true, |min| *score >= min))
            .take(top_k)
            .enumerate()
            .map(|(rank, (hit, rerank_score))| RankedHit {
                hit,
                rerank_score,
                rank,
            })
            .collect();

        tracing::debug!(
            kept = ranked.len(),
            top_score = ranked.first().map(|r| r.rerank_score),
            "reranked hits"
        );

        Ok(ranked)
    }

    /// Get current configuration
    pub fn config(&self) -> &ReRankConfig {
        &self.config
    }

    /// Update configuration
    pub fn set_config(&mut self, config: ReRankConfig) {
        self.config = config;
    }
}

/// Calibrated scores stay strictly inside (0, 1), even for saturated logits
const SCORE_FLOOR: f32 = f32::MIN_POSITIVE;
const SCORE_CEILING: f32 = 1.0 - f32::EPSILON;

/// Logistic calibration of a raw logit into (0, 1)
pub fn sigmoid(x: f32) -> f32 {
    (1.0 / (1.0 + (-x).exp())).clamp(SCORE_FLOOR, SCORE_CEILING)
}

/// NaN becomes the lowest possible score; -0.0 is folded into 0.0 so it ties
fn sanitize(raw: f32) -> f32 {
    if raw.is_nan() {
        f32::NEG_INFINITY
    } else if raw == 0.0 {
        0.0
    } else {
        raw
    }
}
