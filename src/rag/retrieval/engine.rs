// Retrieval engine over an injected hybrid (vector + keyword) search service
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::{RagError, Result};
use crate::types::SearchHit;

/// Properties requested from the index for every hit
pub const DEFAULT_DISPLAY_PROPERTIES: &[&str] = &[
    "doc_id",
    "guest",
    "title",
    "summary",
    "content",
    "episode_url",
    "thumbnail_url",
    "length",
];

/// Comparison applied by a [`WhereFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    Equal,
}

/// Equality filter on a named metadata field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereFilter {
    pub path: Vec<String>,
    pub operator: FilterOperator,
    pub value_text: String,
}

impl WhereFilter {
    pub fn equal(field: &str, value: &str) -> Self {
        Self {
            path: vec![field.to_string()],
            operator: FilterOperator::Equal,
            value_text: value.to_string(),
        }
    }

    /// Restrict results to one guest
    pub fn guest(name: &str) -> Self {
        Self::equal("guest", name)
    }
}

/// One hybrid search request
#[derive(Debug, Clone, PartialEq)]
pub struct HybridQuery {
    pub query: String,
    pub class_name: String,
    /// 0.0 = pure keyword, 1.0 = pure vector
    pub alpha: f32,
    pub display_properties: Vec<String>,
    pub where_filter: Option<WhereFilter>,
    pub limit: usize,
}

/// Search collaborator. Implementations must be safe for concurrent use.
#[async_trait]
pub trait HybridSearch: Send + Sync {
    async fn hybrid_search(&self, request: &HybridQuery) -> Result<Vec<SearchHit>>;
}

/// Default search parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub class_name: String,
    pub alpha: f32,
    pub limit: usize,
    pub display_properties: Vec<String>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            class_name: "ImpactTheoryMinilm256".to_string(),
            alpha: 0.5,
            limit: 10,
            display_properties: DEFAULT_DISPLAY_PROPERTIES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl SearchParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(RagError::ConfigError(format!(
                "alpha must be between 0.0 and 1.0, got {}",
                self.alpha
            )));
        }
        if self.limit == 0 {
            return Err(RagError::ConfigError("retrieval limit must be greater than 0".to_string()));
        }
        if self.class_name.is_empty() {
            return Err(RagError::ConfigError("class name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Retrieval engine for hybrid search
pub struct RetrievalEngine {
    search: Arc<dyn HybridSearch>,
    default_params: SearchParams,
}

impl RetrievalEngine {
    pub fn new(search: Arc<dyn HybridSearch>) -> Self {
        Self::with_params(search, SearchParams::default())
    }

    pub fn with_params(search: Arc<dyn HybridSearch>, params: SearchParams) -> Self {
        Self {
            search,
            default_params: params,
        }
    }

    /// Retrieve with the default parameters
    pub async fn retrieve(&self, query: &str, filter: Option<WhereFilter>) -> Result<Vec<SearchHit>> {
        self.retrieve_with_params(query, &self.default_params, filter).await
    }

    /// Retrieve with custom parameters
    pub async fn retrieve_with_params(
        &self,
        query: &str,
        params: &SearchParams,
        filter: Option<WhereFilter>,
    ) -> Result<Vec<SearchHit>> {
        params.validate()?;

        let request = HybridQuery {
            query: query.to_string(),
            class_name: params.class_name.clone(),
            alpha: params.alpha,
            display_properties: params.display_properties.clone(),
            where_filter: filter,
            limit: params.limit,
        };

        let hits = self.search.hybrid_search(&request).await?;
        tracing::debug!(hits = hits.len(), class = %request.class_name, alpha = request.alpha, "hybrid search");
        Ok(hits)
    }

    /// Get default search parameters
    pub fn default_params(&self) -> &SearchParams {
        &self.default_params
    }

    /// Update default search parameters
    pub fn set_default_params(&mut self, params: SearchParams) {
        self.default_params = params;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hits::fixtures::hit;
    use std::sync::Mutex;

    /// Records the last request and returns canned hits
    #[derive(Default)]
    struct RecordingSearch {
        last: Mutex<Option<HybridQuery>>,
    }

    #[async_trait]
    impl HybridSearch for RecordingSearch {
        async fn hybrid_search(&self, request: &HybridQuery) -> Result<Vec<SearchHit>> {
            *self.last.lock().unwrap() = Some(request.clone());
            Ok(vec![hit("a", "one"), hit("b", "two")])
        }
    }

    #[test]
    fn test_search_params_default() {
        let params = SearchParams::default();
        assert_eq!(params.limit, 10);
        assert!(params.display_properties.contains(&"summary".to_string()));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_alpha_out_of_range() {
        let params = SearchParams {
            alpha: 1.5,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn test_guest_filter() {
        let filter = WhereFilter::guest("Jane Doe");
        assert_eq!(filter.path, vec!["guest".to_string()]);
        assert_eq!(filter.operator, FilterOperator::Equal);
        assert_eq!(filter.value_text, "Jane Doe");
    }

    #[tokio::test]
    async fn test_retrieve_passes_parameters() {
        let search = Arc::new(RecordingSearch::default());
        let params = SearchParams {
            alpha: 0.25,
            limit: 7,
            ..Default::default()
        };
        let engine = RetrievalEngine::with_params(search.clone(), params);

        let hits = engine.retrieve("habits", Some(WhereFilter::guest("Jane"))).await.unwrap();
        assert_eq!(hits.len(), 2);

        let request = search.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.query, "habits");
        assert_eq!(request.alpha, 0.25);
        assert_eq!(request.limit, 7);
        assert_eq!(request.where_filter, Some(WhereFilter::guest("Jane")));
    }

    #[tokio::test]
    async fn test_invalid_params_never_reach_search() {
        let search = Arc::new(RecordingSearch::default());
        let engine = RetrievalEngine::new(search.clone());
        let params = SearchParams {
            limit: 0,
            ..Default::default()
        };

        assert!(engine.retrieve_with_params("q", &params, None).await.is_err());
        assert!(search.last.lock().unwrap().is_none());
    }
}
