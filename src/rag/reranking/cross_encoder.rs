// Cross-encoder relevance model: BERT + pooler + single-logit classifier via Candle
use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::{api::sync::Api, Repo, RepoType};
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};

use crate::errors::{RagError, Result};

pub const DEFAULT_CROSS_ENCODER: &str = "cross-encoder/ms-marco-MiniLM-L-6-v2";

/// Scores (query, passage) pairs jointly. Scores are raw logits.
pub trait CrossEncoder: Send + Sync {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;

    fn model_id(&self) -> &str;
}

/// Cross-encoder running locally on Candle (CPU)
pub struct CandleCrossEncoder {
    model: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
}

impl CandleCrossEncoder {
    /// Download (on first use) and load a sequence-classification BERT
    pub fn load(model_id: &str, max_length: usize) -> Result<Self> {
        let device = Device::Cpu;

        let api = Api::new()
            .map_err(|e| RagError::ModelError(format!("Failed to create HuggingFace API client: {}", e)))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let fetch = |file: &str| {
            repo.get(file)
                .map_err(|e| RagError::ModelError(format!("Failed to download {} for {}: {}", file, model_id, e)))
        };
        let config_path = fetch("config.json")?;
        let tokenizer_path = fetch("tokenizer.json")?;
        let weights_path = fetch("model.safetensors")?;

        let config_contents = std::fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_contents)?;
        let hidden_size = serde_json::from_str::<serde_json::Value>(&config_contents)?
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| RagError::ModelError("config.json has no hidden_size".to_string()))?
            as usize;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| RagError::TokenizerError(format!("Failed to load tokenizer: {}", e)))?;
        tokenizer.with_padding(Some(PaddingParams::default()));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| RagError::TokenizerError(format!("Invalid truncation: {}", e)))?;

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)? };

        let model = BertModel::load(vb.pp("bert"), &config)?;
        let pooler = linear(hidden_size, hidden_size, vb.pp("bert.pooler.dense"))?;
        let classifier = linear(hidden_size, 1, vb.pp("classifier"))?;

        tracing::info!(model = model_id, "cross-encoder loaded");

        Ok(Self {
            model,
            pooler,
            classifier,
            tokenizer,
            device,
            model_id: model_id.to_string(),
        })
    }

    fn pair_tensor(&self, rows: Vec<Vec<u32>>) -> Result<Tensor> {
        let batch = rows.len();
        let seq_len = rows.first().map(|r| r.len()).unwrap_or(0);
        let flat: Vec<u32> = rows.into_iter().flatten().collect();
        Ok(Tensor::from_vec(flat, (batch, seq_len), &self.device)?)
    }
}

impl CrossEncoder for CandleCrossEncoder {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(&str, &str)> = passages.iter().map(|p| (query, *p)).collect();
        let encodings = self
            .tokenizer
            .encode_batch(pairs, true)
            .map_err(|e| RagError::TokenizerError(format!("Tokenization failed: {}", e)))?;

        let input_ids = self.pair_tensor(encodings.iter().map(|e| e.get_ids().to_vec()).collect())?;
        let type_ids = self.pair_tensor(encodings.iter().map(|e| e.get_type_ids().to_vec()).collect())?;
        let attention_mask =
            self.pair_tensor(encodings.iter().map(|e| e.get_attention_mask().to_vec()).collect())?;

        // (batch, seq, hidden) → [CLS] → pooler → logit
        let hidden = self.model.forward(&input_ids, &type_ids, Some(&attention_mask))?;
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?.squeeze(1)?;

        Ok(logits.to_vec1::<f32>()?)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Integration test - requires model download
    fn test_relevant_passage_scores_higher() {
        let encoder = CandleCrossEncoder::load(DEFAULT_CROSS_ENCODER, 512).expect("Failed to load model");
        let scores = encoder
            .score(
                "How many people live in Berlin?",
                &[
                    "Berlin has a population of 3,520,031 registered inhabitants.",
                    "New York City is famous for the Metropolitan Museum of Art.",
                ],
            )
            .expect("Failed to score");

        assert_eq!(scores.len(), 2);
        assert!(scores[0] > scores[1]);
    }

    #[test]
    #[ignore] // Integration test - requires model download
    fn test_empty_batch() {
        let encoder = CandleCrossEncoder::load(DEFAULT_CROSS_ENCODER, 512).expect("Failed to load model");
        assert!(encoder.score("query", &[]).unwrap().is_empty());
    }
}
