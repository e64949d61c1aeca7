use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::NaiveDate;

use super::knowledge::KnowledgeBase;
use super::types::{
    MetadataFilter, QueryType, RetrievalResult, RetrievedDocument, RoutingDecision,
    ScoredDocument, VectorSearch,
};
use super::RagError;
use crate::pipeline::patterns::PatternTable;

/// Snippet length in characters.
pub const SNIPPET_CHARS: usize = 200;

pub const EMERGENCY_PROTOCOL_SOURCE: &str = "Emergency Protocol";

/// First `SNIPPET_CHARS` characters of the content, with an ellipsis when cut.
pub fn context_snippet(content: &str) -> String {
    match content.char_indices().nth(SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// The canned emergency result. Does not depend on any index.
pub fn emergency_protocol_results() -> Vec<RetrievalResult> {
    let document = RetrievedDocument {
        id: "emergency_protocol".into(),
        content: "EMERGENCY: Seek immediate medical attention. Call emergency services.".into(),
        source: EMERGENCY_PROTOCOL_SOURCE.into(),
        category: "emergency".into(),
        confidence: 1.0,
        last_updated: NaiveDate::from_ymd_opt(2024, 1, 1),
        metadata: HashMap::from([(
            "priority".to_string(),
            serde_json::Value::String("critical".into()),
        )]),
    };

    vec![RetrievalResult {
        document,
        relevance_score: 1.0,
        context_snippet: "Emergency protocol activated".into(),
    }]
}

/// Multiply the relevance of category-aligned documents, cap at 1.0, and
/// re-sort descending. Equal scores keep their prior order.
pub fn apply_category_boost(
    table: &PatternTable,
    query_type: QueryType,
    results: &mut [RetrievalResult],
) {
    for result in results.iter_mut() {
        if let Some(factor) = table.boost_for(query_type, &result.document.category) {
            result.relevance_score = (result.relevance_score * factor).min(1.0);
        }
    }

    results.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(Ordering::Equal)
    });
}

fn to_result(hit: ScoredDocument) -> RetrievalResult {
    let relevance_score = if hit.score.is_finite() {
        hit.score.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let context_snippet = context_snippet(&hit.document.content);
    RetrievalResult {
        document: hit.document,
        relevance_score,
        context_snippet,
    }
}

/// Turns a routing decision into a ranked evidence set.
pub struct RetrievalCoordinator<'a, V: VectorSearch> {
    table: &'a PatternTable,
    search: Option<&'a V>,
    knowledge: Option<&'a KnowledgeBase>,
    timeout: Duration,
}

impl<'a, V: VectorSearch> RetrievalCoordinator<'a, V> {
    /// `search` is `None` when the vector-search collaborator is unavailable.
    pub fn new(table: &'a PatternTable, search: Option<&'a V>, timeout: Duration) -> Self {
        Self {
            table,
            search,
            knowledge: None,
            timeout,
        }
    }

    pub fn with_knowledge(mut self, knowledge: Option<&'a KnowledgeBase>) -> Self {
        self.knowledge = knowledge;
        self
    }

    /// Retrieve and rank evidence for a decision. Never fails: collaborator
    /// errors and timeouts yield whatever the knowledge base alone provides.
    pub async fn retrieve(
        &self,
        query: &str,
        decision: &RoutingDecision,
        base_filter: Option<&MetadataFilter>,
    ) -> Vec<RetrievalResult> {
        if decision.emergency_flag {
            tracing::info!("Emergency protocol: bypassing vector search");
            return emergency_protocol_results();
        }

        let filter = MetadataFilter::merged(base_filter, decision.category_filter.as_deref());

        let mut results: Vec<RetrievalResult> = match self
            .search_with_timeout(query, decision.recommended_k, filter.as_ref())
            .await
        {
            Ok(hits) => hits.into_iter().map(to_result).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Retrieval unavailable, continuing without index results");
                Vec::new()
            }
        };

        if let Some(hit) = self.knowledge.and_then(|kb| kb.lookup(query)) {
            let passes_filter = filter.as_ref().map_or(true, |f| f.matches(&hit.document));
            let seen: HashSet<&str> = results.iter().map(|r| r.document.id.as_str()).collect();
            if passes_filter && !seen.contains(hit.document.id.as_str()) {
                results.push(to_result(hit));
            }
        }

        apply_category_boost(self.table, decision.query_type, &mut results);

        tracing::info!(
            query_type = %decision.query_type,
            strategy = %decision.retrieval_strategy,
            count = results.len(),
            "Retrieved documents"
        );
        results
    }

    async fn search_with_timeout(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredDocument>, RagError> {
        let search = self.search.ok_or(RagError::Unavailable("vector search"))?;
        match tokio::time::timeout(self.timeout, search.search(query, top_k, filter)).await {
            Ok(result) => result,
            Err(_) => Err(RagError::Timeout {
                service: "vector search",
                millis: self.timeout.as_millis(),
            }),
        }
    }
}

/// In-process search over a fixed document set, scored by query-term overlap.
///
/// Honors metadata filters like the external service does. Used by tests and
/// by library callers that embed a pipeline over their own documents; the
/// server only talks to an external vector service.
pub struct InMemoryVectorSearch {
    documents: Vec<RetrievedDocument>,
}

impl InMemoryVectorSearch {
    pub fn new() -> Self {
        Self {
            documents: Vec::new(),
        }
    }

    pub fn add(&mut self, document: RetrievedDocument) {
        self.documents.push(document);
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl Default for InMemoryVectorSearch {
    fn default() -> Self {
        Self::new()
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(|w| w.to_lowercase())
        .collect()
}

fn overlap_score(query_terms: &HashSet<String>, content: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let doc_terms = terms(content);
    let shared = query_terms.iter().filter(|t| doc_terms.contains(*t)).count();
    shared as f32 / query_terms.len() as f32
}

impl VectorSearch for InMemoryVectorSearch {
    async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredDocument>, RagError> {
        let query_terms = terms(query_text);

        let mut scored: Vec<ScoredDocument> = self
            .documents
            .iter()
            .filter(|doc| filter.map_or(true, |f| f.matches(doc)))
            .map(|doc| ScoredDocument {
                document: doc.clone(),
                score: overlap_score(&query_terms, &doc.content),
            })
            .filter(|hit| hit.score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}
