//! Shared types for the HTTP layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::pipeline::orchestrator::{ConfidenceTier, Pipeline, PipelineResponse};
use crate::pipeline::rag::types::{LlmGenerate, MetadataFilter, Query, VectorSearch};

/// Longest accepted query, in characters.
pub const MAX_QUERY_CHARS: usize = 2_000;

// ═══════════════════════════════════════════════════════════
// API context
// ═══════════════════════════════════════════════════════════

/// Shared state for all routes.
pub struct ApiContext<V: VectorSearch, G: LlmGenerate> {
    pub pipeline: Arc<Pipeline<V, G>>,
    /// Cancelled on server shutdown; each request watches a child token.
    pub shutdown: CancellationToken,
}

impl<V: VectorSearch, G: LlmGenerate> ApiContext<V, G> {
    pub fn new(pipeline: Pipeline<V, G>, shutdown: CancellationToken) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            shutdown,
        }
    }
}

impl<V: VectorSearch, G: LlmGenerate> Clone for ApiContext<V, G> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            shutdown: self.shutdown.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Request / response bodies
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub filter: Option<MetadataFilter>,
}

impl QueryRequest {
    /// Validate and convert into a pipeline query.
    pub fn into_query(self) -> Result<Query, String> {
        let text = self.query.trim();
        if text.is_empty() {
            return Err("query must not be empty".into());
        }
        if text.chars().count() > MAX_QUERY_CHARS {
            return Err(format!("query exceeds {MAX_QUERY_CHARS} characters"));
        }

        let mut query = Query::new(text);
        if let Some(intent) = self.intent.filter(|i| !i.trim().is_empty()) {
            query = query.with_intent(intent);
        }
        if let Some(filter) = self.filter.filter(|f| !f.is_empty()) {
            query = query.with_filter(filter);
        }
        Ok(query)
    }
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    #[serde(flatten)]
    pub response: PipelineResponse,
    pub confidence_tier: ConfidenceTier,
    pub display_text: String,
}

impl From<PipelineResponse> for QueryResponse {
    fn from(response: PipelineResponse) -> Self {
        Self {
            confidence_tier: response.confidence_tier(),
            display_text: response.display_text(),
            response,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub patterns_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> QueryRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn minimal_request_converts() {
        let query = request(r#"{"query": "  chest pain  "}"#).into_query().unwrap();
        assert_eq!(query.text, "chest pain");
        assert!(query.upstream_intent.is_none());
        assert!(query.metadata_filter.is_none());
    }

    #[test]
    fn intent_and_filter_carried_through() {
        let query = request(
            r#"{"query": "metformin", "intent": "ask_medication", "filter": {"updated_since": "2024-01-01"}}"#,
        )
        .into_query()
        .unwrap();
        assert_eq!(query.upstream_intent.as_deref(), Some("ask_medication"));
        assert_eq!(
            query.metadata_filter.unwrap().updated_since,
            Some("2024-01-01".parse().unwrap())
        );
    }

    #[test]
    fn blank_intent_and_empty_filter_dropped() {
        let query = request(r#"{"query": "metformin", "intent": " ", "filter": {}}"#)
            .into_query()
            .unwrap();
        assert!(query.upstream_intent.is_none());
        assert!(query.metadata_filter.is_none());
    }

    #[test]
    fn empty_and_oversized_queries_rejected() {
        assert!(request(r#"{"query": "   "}"#).into_query().is_err());
        let long = "a".repeat(MAX_QUERY_CHARS + 1);
        let req = QueryRequest {
            query: long,
            intent: None,
            filter: None,
        };
        assert!(req.into_query().is_err());
    }
}
