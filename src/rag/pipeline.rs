// End-to-end pipeline: retrieve -> rerank -> select -> assemble -> stream
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::context::{BudgetSelection, ContextBudgetSelector, SelectionPolicy, TokenEstimator};
use crate::errors::{RagError, Result};
use crate::rag::citations::citations;
use crate::rag::prompt::PromptAssembler;
use crate::rag::reranking::{CrossEncoder, ReRankConfig, ReRanker};
use crate::rag::retrieval::{HybridSearch, RetrievalEngine, SearchParams, WhereFilter};
use crate::streaming::{CompletionClient, CompletionStream};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::{CitationEntry, RankedHit};

/// Context window budget for `gpt-3.5-turbo`, leaving room for the answer
pub const DEFAULT_TOKEN_THRESHOLD: usize = 4000;

/// Answer length cap
pub const DEFAULT_MAX_TOKENS: usize = 350;

/// What to do when no passage fits the token budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyContextPolicy {
    /// Ask the model anyway, with an empty series
    #[default]
    Answer,
    /// Do not call the model
    Refuse,
}

/// RAG pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub search: SearchParams,
    pub rerank: ReRankConfig,
    pub token_threshold: usize,
    pub selection_policy: SelectionPolicy,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            search: SearchParams::default(),
            rerank: ReRankConfig::default(),
            token_threshold: DEFAULT_TOKEN_THRESHOLD,
            selection_policy: SelectionPolicy::default(),
            temperature: 1.0,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl RagConfig {
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;

        if self.rerank.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than 0".to_string()));
        }
        if self.token_threshold == 0 {
            return Err(RagError::ConfigError(
                "token_threshold must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::ConfigError(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(RagError::ConfigError("max_tokens must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Per-query overrides of the configured defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    /// Restrict retrieval to one guest
    pub guest: Option<String>,
    pub alpha: Option<f32>,
    pub limit: Option<usize>,
    pub top_k: Option<usize>,
    pub temperature: Option<f32>,
    pub class_name: Option<String>,
}

/// Whether the prompt carries any retrieved passages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundingContext {
    Grounded,
    /// Nothing fit the budget; the prompt has an empty series
    Ungrounded,
}

/// Everything computed before generation starts
#[derive(Debug, Clone)]
pub struct PreparedAnswer {
    pub request_id: Uuid,
    pub query: String,
    /// Reranked hits, best first
    pub ranked: Vec<RankedHit>,
    pub selection: BudgetSelection,
    pub grounding: GroundingContext,
    pub prompt: String,
    /// Deduplicated sources for display, in rank order
    pub citations: Vec<CitationEntry>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl PreparedAnswer {
    pub fn is_grounded(&self) -> bool {
        self.grounding == GroundingContext::Grounded
    }

    /// Whether generation should run under `policy`
    pub fn should_generate(&self, policy: EmptyContextPolicy) -> bool {
        self.is_grounded() || policy == EmptyContextPolicy::Answer
    }
}

/// End-to-end RAG pipeline over injected collaborators
pub struct RagPipeline {
    retrieval: RetrievalEngine,
    reranker: ReRanker,
    estimator: Arc<dyn TokenEstimator>,
    completion: Arc<dyn CompletionClient>,
    assembler: PromptAssembler,
    config: RagConfig,
    telemetry: TelemetryCollector,
}

impl RagPipeline {
    /// Create a pipeline with the default configuration and prompt
    pub fn new(
        search: Arc<dyn HybridSearch>,
        encoder: Arc<dyn CrossEncoder>,
        estimator: Arc<dyn TokenEstimator>,
        completion: Arc<dyn CompletionClient>,
    ) -> Self {
        let config = RagConfig::default();
        Self {
            retrieval: RetrievalEngine::with_params(search, config.search.clone()),
            reranker: ReRanker::with_config(encoder, config.rerank.clone()),
            estimator,
            completion,
            assembler: PromptAssembler::default(),
            config,
            telemetry: TelemetryCollector::new(),
        }
    }

    /// Replace the configuration, validating it first
    pub fn with_config(mut self, config: RagConfig) -> Result<Self> {
        self.set_config(config)?;
        Ok(self)
    }

    pub fn with_assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Run retrieval through prompt assembly for one query
    pub async fn prepare(&self, query: &str, params: &QueryParams) -> Result<PreparedAnswer> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("query", %request_id);

        self.prepare_inner(request_id, query, params)
            .instrument(span)
            .await
    }

    async fn prepare_inner(
        &self,
        request_id: Uuid,
        query: &str,
        params: &QueryParams,
    ) -> Result<PreparedAnswer> {
        let search_params = self.search_params(params);
        let filter = params.guest.as_deref().map(WhereFilter::guest);

        let started = Instant::now();
        let hits = self
            .retrieval
            .retrieve_with_params(query, &search_params, filter)
            .await?;
        self.telemetry.record(TelemetryEvent::Retrieved {
            hits: hits.len(),
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Instant::now(),
        });

        let candidates = hits.len();
        let started = Instant::now();
        let top_k = params.top_k.unwrap_or(self.config.rerank.top_k);
        let ranked = self
            .reranker
            .rerank_with(hits, query, top_k, self.config.rerank.apply_calibration)?;
        self.telemetry.record(TelemetryEvent::Reranked {
            candidates,
            kept: ranked.len(),
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Instant::now(),
        });

        let selector =
            ContextBudgetSelector::with_policy(self.config.token_threshold, self.config.selection_policy);
        let selection = selector.select(&ranked, &self.assembler, query, self.estimator.as_ref());
        self.telemetry.record(TelemetryEvent::ContextSelected {
            accepted: selection.accepted.len(),
            rejected: selection.rejected.len(),
            prompt_tokens: selection.prompt_tokens,
            timestamp: Instant::now(),
        });

        let grounding = if selection.is_exhausted() {
            tracing::warn!(
                threshold = selection.threshold,
                skeleton_tokens = selection.skeleton_tokens,
                "no passage fits the token budget"
            );
            GroundingContext::Ungrounded
        } else {
            GroundingContext::Grounded
        };

        let prompt = self.assembler.build(query, &selection.accepted);
        let citations = citations(&selection.accepted);

        tracing::info!(
            candidates,
            ranked = ranked.len(),
            accepted = selection.accepted.len(),
            prompt_tokens = selection.prompt_tokens,
            citations = citations.len(),
            "prompt prepared"
        );

        Ok(PreparedAnswer {
            request_id,
            query: query.to_string(),
            ranked,
            selection,
            grounding,
            prompt,
            citations,
            temperature: params.temperature.unwrap_or(self.config.temperature),
            max_tokens: self.config.max_tokens,
        })
    }

    /// Open the answer stream for a prepared prompt
    pub async fn generate(&self, prepared: &PreparedAnswer) -> Result<CompletionStream> {
        let span = tracing::info_span!("generate", request_id = %prepared.request_id);

        let stream = CompletionStream::open(
            self.completion.as_ref(),
            &prepared.prompt,
            prepared.temperature,
            prepared.max_tokens,
        )
        .instrument(span)
        .await?;

        Ok(stream.with_telemetry(self.telemetry.clone()))
    }

    fn search_params(&self, params: &QueryParams) -> SearchParams {
        let defaults = self.retrieval.default_params();
        SearchParams {
            class_name: params
                .class_name
                .clone()
                .unwrap_or_else(|| defaults.class_name.clone()),
            alpha: params.alpha.unwrap_or(defaults.alpha),
            limit: params.limit.unwrap_or(defaults.limit),
            display_properties: defaults.display_properties.clone(),
        }
    }

    /// Get current configuration
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Update configuration
    pub fn set_config(&mut self, config: RagConfig) -> Result<()> {
        config.validate()?;
        self.retrieval.set_default_params(config.search.clone());
        self.reranker.set_config(config.rerank.clone());
        self.config = config;
        Ok(())
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }

    pub fn completion(&self) -> &Arc<dyn CompletionClient> {
        &self.completion
    }
}
