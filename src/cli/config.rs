//! Configuration management for RagBuddy
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.ragbuddy/config.toml
//!
//! Credentials are never stored here. Each service names the environment
//! variable its key is read from.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::context::SelectionPolicy;
use crate::errors::{RagError, Result};
use crate::rag::prompt::{CONTEXT_BLOCK_TEMPLATE, QUESTION_ANSWERING_TEMPLATE};
use crate::rag::reranking::{ReRankConfig, DEFAULT_CROSS_ENCODER};
use crate::rag::retrieval::SearchParams;
use crate::rag::{EmptyContextPolicy, RagConfig};
use crate::streaming::{
    DEFAULT_OLLAMA_URL, DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_URL, DEFAULT_SYSTEM_MESSAGE,
    REQUEST_TIMEOUT,
};

/// Complete configuration for RagBuddy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub rerank: RerankSection,
    pub generation: GenerationConfig,
    pub budget: BudgetConfig,
    pub prompt: PromptConfig,
}

/// Hybrid search service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key_env: String,
    pub class_name: String,
    pub alpha: f32,
    pub limit: usize,
    pub display_properties: Vec<String>,
}

/// Cross-encoder reranking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSection {
    pub model: String,
    pub top_k: usize,
    pub apply_calibration: bool,
    pub min_score: Option<f32>,
    pub max_length: usize,
}

/// Completion provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Ollama,
}

/// Answer generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: Provider,
    /// Service URL; defaults to the provider's standard endpoint
    pub base_url: Option<String>,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub system_message: String,
    /// Whole-request timeout for the completion service, in seconds
    pub request_timeout_secs: u64,
    /// Give up on an answer stream after this many seconds
    pub stream_deadline_secs: Option<u64>,
}

/// Token budget for the grounding prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub token_threshold: usize,
    /// Tokenizer model; defaults to the generation model
    pub tokenizer_model: Option<String>,
    /// HuggingFace repository with a `tokenizer.json`, for non-OpenAI models
    pub tokenizer_repo: Option<String>,
    pub selection_policy: SelectionPolicy,
    pub empty_context: EmptyContextPolicy,
}

/// Prompt templates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub template: String,
    pub block_template: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let params = SearchParams::default();
        Self {
            endpoint: "http://localhost:8080".to_string(),
            api_key_env: "WEAVIATE_API_KEY".to_string(),
            class_name: params.class_name,
            alpha: params.alpha,
            limit: params.limit,
            display_properties: params.display_properties,
        }
    }
}

impl Default for RerankSection {
    fn default() -> Self {
        let rerank = ReRankConfig::default();
        Self {
            model: DEFAULT_CROSS_ENCODER.to_string(),
            top_k: rerank.top_k,
            apply_calibration: rerank.apply_calibration,
            min_score: rerank.min_score,
            max_length: 512,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let rag = RagConfig::default();
        Self {
            provider: Provider::OpenAi,
            base_url: None,
            model: DEFAULT_OPENAI_MODEL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: rag.temperature,
            max_tokens: rag.max_tokens,
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT.as_secs(),
            stream_deadline_secs: None,
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            token_threshold: RagConfig::default().token_threshold,
            tokenizer_model: None,
            tokenizer_repo: None,
            selection_policy: SelectionPolicy::default(),
            empty_context: EmptyContextPolicy::default(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: QUESTION_ANSWERING_TEMPLATE.to_string(),
            block_template: CONTEXT_BLOCK_TEMPLATE.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RagError::ConfigError(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| RagError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_path();
        if config_path.exists() {
            return Self::load_from_file(&config_path);
        }

        Ok(Config::default())
    }

    /// Standard config location
    pub fn default_path() -> PathBuf {
        Self::expand_path("~/.ragbuddy/config.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.rag_config().validate()?;

        if self.search.endpoint.is_empty() {
            return Err(RagError::ConfigError("search endpoint must not be empty".to_string()));
        }

        if self.rerank.max_length == 0 {
            return Err(RagError::ConfigError(
                "rerank max_length must be greater than 0".to_string(),
            ));
        }

        if let Some(min_score) = self.rerank.min_score {
            if min_score.is_nan() {
                return Err(RagError::ConfigError("rerank min_score must be a number".to_string()));
            }
        }

        if self.generation.model.is_empty() {
            return Err(RagError::ConfigError("generation model must not be empty".to_string()));
        }

        if self.generation.request_timeout_secs == 0 {
            return Err(RagError::ConfigError(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.generation.stream_deadline_secs == Some(0) {
            return Err(RagError::ConfigError(
                "stream_deadline_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RagError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RagError::ConfigError(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| RagError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Pipeline settings derived from the file
    pub fn rag_config(&self) -> RagConfig {
        RagConfig {
            search: SearchParams {
                class_name: self.search.class_name.clone(),
                alpha: self.search.alpha,
                limit: self.search.limit,
                display_properties: self.search.display_properties.clone(),
            },
            rerank: ReRankConfig {
                top_k: self.rerank.top_k,
                apply_calibration: self.rerank.apply_calibration,
                min_score: self.rerank.min_score,
            },
            token_threshold: self.budget.token_threshold,
            selection_policy: self.budget.selection_policy,
            temperature: self.generation.temperature,
            max_tokens: self.generation.max_tokens,
        }
    }

    /// Completion service URL for the configured provider
    pub fn generation_url(&self) -> &str {
        match (&self.generation.base_url, self.generation.provider) {
            (Some(url), _) => url,
            (None, Provider::OpenAi) => DEFAULT_OPENAI_URL,
            (None, Provider::Ollama) => DEFAULT_OLLAMA_URL,
        }
    }

    /// Model whose tokenizer measures the prompt
    pub fn tokenizer_model(&self) -> &str {
        self.budget
            .tokenizer_model
            .as_deref()
            .unwrap_or(&self.generation.model)
    }

    /// Read an API key from the named environment variable
    pub fn api_key(env_var: &str) -> Option<String> {
        if env_var.is_empty() {
            return None;
        }
        std::env::var(env_var).ok().filter(|key| !key.is_empty())
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// REPL history file
    pub fn history_path() -> PathBuf {
        Self::expand_path("~/.ragbuddy/history")
    }
}
