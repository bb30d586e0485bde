// Weaviate hybrid search over the GraphQL API
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::errors::{RagError, Result};
use crate::rag::retrieval::engine::{FilterOperator, HybridQuery, HybridSearch, WhereFilter};
use crate::types::SearchHit;

/// Request timeout (30 seconds)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Weaviate client
#[derive(Debug, Clone)]
pub struct WeaviateClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl WeaviateClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(RagError::HttpError)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Liveness probe
    pub async fn is_live(&self) -> Result<bool> {
        self.probe("/v1/.well-known/live").await
    }

    /// Readiness probe
    pub async fn is_ready(&self) -> Result<bool> {
        self.probe("/v1/.well-known/ready").await
    }

    async fn probe(&self, path: &str) -> Result<bool> {
        let url = format!("{}{}", self.base_url, path);
        match self.authorized(self.client.get(&url)).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Names of the classes in the schema
    pub async fn show_classes(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1/schema", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| RagError::Retrieval(format!("Failed to fetch schema: {}", e)))?;

        if !response.status().is_success() {
            return Err(RagError::Retrieval(format!("Schema request failed: HTTP {}", response.status())));
        }

        let schema: SchemaResponse = response
            .json()
            .await
            .map_err(|e| RagError::Retrieval(format!("Failed to parse schema: {}", e)))?;

        Ok(schema.classes.into_iter().map(|c| c.class).collect())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl HybridSearch for WeaviateClient {
    async fn hybrid_search(&self, request: &HybridQuery) -> Result<Vec<SearchHit>> {
        let url = format!("{}/v1/graphql", self.base_url);
        let body = serde_json::json!({ "query": graphql_query(request)? });

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Retrieval(format!("Failed to send search request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Retrieval(format!("HTTP {}: {}", status, error_text)));
        }

        let payload: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| RagError::Retrieval(format!("Failed to parse search response: {}", e)))?;

        parse_hits(payload, &request.class_name)
    }
}

/// Build the GraphQL `Get` query for a hybrid search
fn graphql_query(request: &HybridQuery) -> Result<String> {
    ensure_name(&request.class_name)?;
    for property in &request.display_properties {
        ensure_name(property)?;
    }

    let mut arguments = vec![format!(
        "hybrid: {{query: {}, alpha: {}}}",
        quote(&request.query),
        request.alpha
    )];
    if let Some(filter) = &request.where_filter {
        arguments.push(where_clause(filter)?);
    }
    arguments.push(format!("limit: {}", request.limit));

    Ok(format!(
        "{{ Get {{ {}({}) {{ {} _additional {{ score }} }} }} }}",
        request.class_name,
        arguments.join(", "),
        request.display_properties.join(" ")
    ))
}

fn where_clause(filter: &WhereFilter) -> Result<String> {
    for segment in &filter.path {
        ensure_name(segment)?;
    }
    let operator = match filter.operator {
        FilterOperator::Equal => "Equal",
    };
    let path = filter.path.iter().map(|p| quote(p)).collect::<Vec<_>>().join(", ");

    Ok(format!(
        "where: {{path: [{}], operator: {}, valueText: {}}}",
        path,
        operator,
        quote(&filter.value_text)
    ))
}

/// GraphQL string literal; JSON escaping is a valid subset
fn quote(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// Class and property names are interpolated bare, so restrict them to GraphQL names
fn ensure_name(name: &str) -> Result<()> {
    let valid = name.chars().next().map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(RagError::ConfigError(format!("Invalid GraphQL name: {:?}", name)))
    }
}

fn parse_hits(payload: GraphQlResponse, class_name: &str) -> Result<Vec<SearchHit>> {
    if !payload.errors.is_empty() {
        let messages: Vec<String> = payload.errors.into_iter().map(|e| e.message).collect();
        return Err(RagError::Retrieval(messages.join("; ")));
    }

    let records = payload
        .data
        .as_ref()
        .and_then(|d| d.get("Get"))
        .and_then(|g| g.get(class_name))
        .and_then(|c| c.as_array())
        .ok_or_else(|| RagError::Retrieval(format!("Response has no results for class {}", class_name)))?;

    let mut hits = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        match hit_from_record(record) {
            Ok(hit) => hits.push(hit),
            Err(field) => tracing::warn!(index, field, "skipping search result with missing field"),
        }
    }

    Ok(hits)
}

/// Validate one record into a [`SearchHit`]; `Err` names the offending field
fn hit_from_record(record: &Value) -> std::result::Result<SearchHit, &'static str> {
    let text = |field: &'static str| {
        record
            .get(field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or(field)
    };

    let length = record
        .get("length")
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)))
        .ok_or("length")?;

    let score = record
        .get("_additional")
        .and_then(|a| a.get("score"))
        .and_then(|s| match s {
            Value::String(s) => s.parse::<f32>().ok(),
            other => other.as_f64().map(|f| f as f32),
        })
        .unwrap_or(0.0);

    Ok(SearchHit {
        doc_id: text("doc_id")?,
        content: text("content")?,
        guest: text("guest")?,
        title: text("title")?,
        episode_url: text("episode_url")?,
        thumbnail_url: text("thumbnail_url")?,
        length,
        score,
        summary: record.get("summary").and_then(|v| v.as_str()).map(str::to_string),
    })
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SchemaResponse {
    #[serde(default)]
    classes: Vec<SchemaClass>,
}

#[derive(Debug, Deserialize)]
struct SchemaClass {
    class: String,
}
