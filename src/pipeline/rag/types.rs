use std::collections::HashMap;
use std::future::Future;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::RagError;

/// A user's question as it enters the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// Intent code from an upstream NLU layer, when one ran.
    #[serde(default)]
    pub upstream_intent: Option<String>,
    /// Caller-supplied metadata filter, merged with the routing decision.
    #[serde(default)]
    pub metadata_filter: Option<MetadataFilter>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            upstream_intent: None,
            metadata_filter: None,
        }
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.upstream_intent = Some(intent.into());
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.metadata_filter = Some(filter);
        self
    }
}

/// Classified query type determines retrieval strategy, prompt and disclaimer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Emergency,
    DrugInteraction,
    SymptomCheck,
    MedicationInfo,
    ChronicCare,
    MentalHealth,
    Diagnostic,
    GeneralHealth,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::DrugInteraction => "drug_interaction",
            Self::SymptomCheck => "symptom_check",
            Self::MedicationInfo => "medication_info",
            Self::ChronicCare => "chronic_care",
            Self::MentalHealth => "mental_health",
            Self::Diagnostic => "diagnostic",
            Self::GeneralHealth => "general_health",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classifier's decision for one query.
///
/// `emergency_flag == true` implies `query_type == Emergency` and `recommended_k == 1`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingDecision {
    pub query_type: QueryType,
    pub confidence: f32,
    pub retrieval_strategy: String,
    pub emergency_flag: bool,
    pub recommended_k: usize,
    pub category_filter: Option<String>,
}

/// Equality and range filter on document metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetadataFilter {
    #[serde(default)]
    pub category: Option<String>,
    /// Inclusive lower bound on `last_updated`.
    #[serde(default)]
    pub updated_since: Option<NaiveDate>,
    /// Exclusive upper bound on `last_updated`.
    #[serde(default)]
    pub updated_before: Option<NaiveDate>,
}

impl MetadataFilter {
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.updated_since.is_none() && self.updated_before.is_none()
    }

    /// Combine a caller-supplied filter with the classifier's category.
    /// The classifier's category wins when it has one.
    pub fn merged(base: Option<&MetadataFilter>, category: Option<&str>) -> Option<MetadataFilter> {
        let mut filter = base.cloned().unwrap_or_default();
        if let Some(category) = category {
            filter.category = Some(category.to_string());
        }
        (!filter.is_empty()).then_some(filter)
    }

    /// Evaluate the filter against a document.
    /// A date bound excludes documents that have no `last_updated`.
    pub fn matches(&self, doc: &RetrievedDocument) -> bool {
        if let Some(category) = &self.category {
            if &doc.category != category {
                return false;
            }
        }
        if self.updated_since.is_some() || self.updated_before.is_some() {
            let Some(updated) = doc.last_updated else {
                return false;
            };
            if self.updated_since.is_some_and(|since| updated < since) {
                return false;
            }
            if self.updated_before.is_some_and(|before| updated >= before) {
                return false;
            }
        }
        true
    }

    /// Operator-style JSON understood by the vector-search service.
    pub fn to_query_json(&self) -> serde_json::Value {
        let mut root = serde_json::Map::new();
        if let Some(category) = &self.category {
            root.insert("category".into(), serde_json::json!({ "$eq": category }));
        }
        let mut range = serde_json::Map::new();
        if let Some(since) = self.updated_since {
            range.insert("$gte".into(), serde_json::json!(since.to_string()));
        }
        if let Some(before) = self.updated_before {
            range.insert("$lt".into(), serde_json::json!(before.to_string()));
        }
        if !range.is_empty() {
            root.insert("last_updated".into(), serde_json::Value::Object(range));
        }
        serde_json::Value::Object(root)
    }
}

/// A knowledge document as returned by the retrieval collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedDocument {
    pub id: String,
    pub content: String,
    pub source: String,
    pub category: String,
    pub confidence: f32,
    #[serde(default)]
    pub last_updated: Option<NaiveDate>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A document with its raw similarity score (from vector search).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: RetrievedDocument,
    pub score: f32,
}

/// A document in the request's working set.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RetrievalResult {
    pub document: RetrievedDocument,
    /// In [0, 1]; may be raised by category boosting, never above 1.
    pub relevance_score: f32,
    pub context_snippet: String,
}

/// Where a claim in an answer came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceAttribution {
    pub source: String,
    pub category: String,
    pub confidence: f32,
    #[serde(default)]
    pub relevance: Option<f32>,
    #[serde(default)]
    pub last_updated: Option<NaiveDate>,
}

impl SourceAttribution {
    pub fn from_result(result: &RetrievalResult) -> Self {
        Self {
            source: result.document.source.clone(),
            category: result.document.category.clone(),
            confidence: result.document.confidence,
            relevance: Some(result.relevance_score),
            last_updated: result.document.last_updated,
        }
    }
}

/// Draft answer produced by the synthesizer (before safety validation)
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GeneratedAnswer {
    pub text: String,
    pub sources: Vec<SourceAttribution>,
    pub preliminary_confidence: f32,
}

/// External vector-search collaborator.
///
/// Results come back sorted by score descending, scores in [0, 1].
pub trait VectorSearch: Send + Sync {
    fn search(
        &self,
        query_text: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> impl Future<Output = Result<Vec<ScoredDocument>, RagError>> + Send;
}

/// External text-generation collaborator. Stateless, single turn.
pub trait LlmGenerate: Send + Sync {
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String, RagError>> + Send;
}
