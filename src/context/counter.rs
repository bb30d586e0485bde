//! Token counting for prompt budgeting
//!
//! The budget guarantee in [`crate::context::budget`] is only as good as the
//! estimator behind it, so every estimator is bound to a model identifier:
//!
//! - [`TiktokenEstimator`]: exact BPE counts for OpenAI model families
//! - [`HuggingFaceEstimator`]: exact counts from a `tokenizer.json`
//! - [`HeuristicEstimator`]: ~4 chars/token with a 10% safety margin, the
//!   last resort when no tokenizer is known for the model

use crate::errors::{RagError, Result};
use hf_hub::api::sync::Api;
use std::path::Path;
use tiktoken_rs::CoreBPE;
use tokenizers::Tokenizer;

/// Counts tokens the way a specific completion model does
pub trait TokenEstimator: Send + Sync {
    /// Token count for `text`. Deterministic and side-effect free.
    fn count_tokens(&self, text: &str) -> usize;

    /// Model the counts are valid for
    fn model_id(&self) -> &str;
}

/// Character-based estimator
///
/// # Estimate
///
/// ```text
/// estimate(text)    = ⌈chars(text) / 4⌉
/// upper_bound(text) = ⌈estimate(text) × 1.10⌉
/// ```
///
/// `count_tokens` reports the upper bound so the budget errs on the safe side.
#[derive(Debug, Clone)]
pub struct HeuristicEstimator {
    model: String,
}

impl HeuristicEstimator {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into() }
    }

    /// Base estimate (chars / 4, rounded up)
    pub fn estimate(&self, text: &str) -> usize {
        let char_count = text.chars().count();
        (char_count + 3) / 4
    }

    /// Conservative upper bound (110% of estimate, rounded up)
    pub fn upper_bound(&self, text: &str) -> usize {
        let base_estimate = self.estimate(text);
        (base_estimate as f64 * 1.10).ceil() as usize
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn count_tokens(&self, text: &str) -> usize {
        self.upper_bound(text)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// BPE counts via tiktoken for OpenAI models
pub struct TiktokenEstimator {
    bpe: CoreBPE,
    model: String,
}

impl TiktokenEstimator {
    /// Resolve the encoding used by `model` (e.g. `gpt-3.5-turbo-0613`)
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model).map_err(|e| {
            RagError::TokenizerError(format!("No tiktoken encoding for {}: {}", model, e))
        })?;

        Ok(Self {
            bpe,
            model: model.to_string(),
        })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Counts from a HuggingFace `tokenizer.json`
pub struct HuggingFaceEstimator {
    tokenizer: Tokenizer,
    fallback: HeuristicEstimator,
    model: String,
}

impl HuggingFaceEstimator {
    /// Load `tokenizer.json` from a local file
    pub fn from_file(model: &str, path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| RagError::TokenizerError(format!("Failed to load tokenizer: {}", e)))?;

        Ok(Self {
            tokenizer,
            fallback: HeuristicEstimator::new(model),
            model: model.to_string(),
        })
    }

    /// Download `tokenizer.json` from a HuggingFace Hub repository
    pub fn from_pretrained(model: &str, repo: &str) -> Result<Self> {
        let api = Api::new()
            .map_err(|e| RagError::TokenizerError(format!("Failed to create HuggingFace API client: {}", e)))?;
        let path = api
            .model(repo.to_string())
            .get("tokenizer.json")
            .map_err(|e| RagError::TokenizerError(format!("Failed to download tokenizer from {}: {}", repo, e)))?;

        Self::from_file(model, &path)
    }
}

impl TokenEstimator for HuggingFaceEstimator {
    fn count_tokens(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                tracing::warn!(model = %self.model, error = %e, "tokenizer failed, using heuristic count");
                self.fallback.count_tokens(text)
            }
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Pick the most accurate estimator available for `model`
///
/// tiktoken is tried first, then an explicitly configured HuggingFace
/// tokenizer repository, then the heuristic.
pub fn estimator_for_model(model: &str, tokenizer_repo: Option<&str>) -> Box<dyn TokenEstimator> {
    if let Ok(estimator) = TiktokenEstimator::for_model(model) {
        return Box::new(estimator);
    }

    if let Some(repo) = tokenizer_repo {
        match HuggingFaceEstimator::from_pretrained(model, repo) {
            Ok(estimator) => return Box::new(estimator),
            Err(e) => tracing::warn!(model, repo, error = %e, "could not load tokenizer"),
        }
    }

    tracing::warn!(model, "no tokenizer known for model, token budget uses a heuristic");
    Box::new(HeuristicEstimator::new(model))
}
