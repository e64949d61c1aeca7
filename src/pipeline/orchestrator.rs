//! End-to-end query pipeline: classify, retrieve, synthesize, validate.

use std::fmt::Display;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::patterns::PatternStore;
use super::rag::classify::classify_query;
use super::rag::knowledge::KnowledgeBase;
use super::rag::retrieval::RetrievalCoordinator;
use super::rag::synthesis::AnswerSynthesizer;
use super::rag::types::{LlmGenerate, Query, QueryType, SourceAttribution, VectorSearch};
use super::safety::{SafetyLevel, SafetyValidator};

pub const DEFAULT_RETRIEVAL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of sources listed in the display text.
const DISPLAY_SOURCES: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Request cancelled")]
    Cancelled,
}

// ═══════════════════════════════════════════════════════════
// Service handles
// ═══════════════════════════════════════════════════════════

/// A collaborator built once at startup, with its availability explicit.
#[derive(Debug)]
pub enum ServiceHandle<S> {
    Available(S),
    Unavailable { reason: String },
}

impl<S> ServiceHandle<S> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Wrap a startup attempt, logging why a service is unavailable.
    pub fn from_result<E: Display>(service: &str, result: Result<S, E>) -> Self {
        match result {
            Ok(s) => {
                tracing::info!(service, "Service available");
                Self::Available(s)
            }
            Err(e) => {
                tracing::warn!(service, error = %e, "Service unavailable, continuing without it");
                Self::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn get(&self) -> Option<&S> {
        match self {
            Self::Available(s) => Some(s),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// "available", or "unavailable: <reason>".
    pub fn status(&self) -> String {
        match self {
            Self::Available(_) => "available".into(),
            Self::Unavailable { reason } => format!("unavailable: {reason}"),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Response
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Moderate,
    Low,
}

impl ConfidenceTier {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.8 {
            Self::High
        } else if score >= 0.6 {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    fn note(&self, score: f32) -> String {
        match self {
            Self::High => format!("**High confidence** ({score:.2}) - Reliable."),
            Self::Moderate => format!("**Moderate confidence** ({score:.2}) - Seek guidance."),
            Self::Low => format!("**Lower confidence** ({score:.2}) - Consult a doctor."),
        }
    }
}

/// What the caller gets back for one query.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PipelineResponse {
    pub request_id: Uuid,
    pub answer: String,
    /// Empty when the answer was blocked.
    pub sources: Vec<SourceAttribution>,
    pub query_type: QueryType,
    pub confidence_score: f32,
    pub emergency_flag: bool,
    pub warnings: Vec<String>,
    pub safety_level: SafetyLevel,
    pub sources_verified: bool,
    pub recommendations: Vec<String>,
    pub patterns_version: String,
}

impl PipelineResponse {
    pub fn confidence_tier(&self) -> ConfidenceTier {
        ConfidenceTier::from_score(self.confidence_score)
    }

    /// Answer with sources, confidence note and warnings, ready to show.
    pub fn display_text(&self) -> String {
        let mut out = self.answer.clone();

        if self.sources_verified && !self.sources.is_empty() {
            let lines: Vec<String> = self
                .sources
                .iter()
                .take(DISPLAY_SOURCES)
                .map(|s| {
                    let mut line = format!("• {} (conf: {:.1})", s.source, s.confidence);
                    if let Some(date) = s.last_updated {
                        line.push_str(&format!(" - Updated: {date}"));
                    }
                    line
                })
                .collect();
            out.push_str("\n\n**Detailed Sources:**\n");
            out.push_str(&lines.join("\n"));
        }

        out.push_str("\n\n");
        out.push_str(&self.confidence_tier().note(self.confidence_score));

        if !self.warnings.is_empty() {
            out.push_str(&format!("\n\n**Warnings:** {}", self.warnings.join("; ")));
        }
        out
    }
}

// ═══════════════════════════════════════════════════════════
// Pipeline
// ═══════════════════════════════════════════════════════════

/// The full query pipeline.
///
/// Stages run strictly in order per request. Requests share only the
/// pattern store (one snapshot per request) and the read-only collaborators.
pub struct Pipeline<V: VectorSearch, G: LlmGenerate> {
    patterns: PatternStore,
    search: ServiceHandle<V>,
    generator: ServiceHandle<G>,
    knowledge: Option<KnowledgeBase>,
    retrieval_timeout: Duration,
    generation_timeout: Duration,
}

impl<V: VectorSearch, G: LlmGenerate> Pipeline<V, G> {
    pub fn new(patterns: PatternStore, search: ServiceHandle<V>, generator: ServiceHandle<G>) -> Self {
        Self {
            patterns,
            search,
            generator,
            knowledge: None,
            retrieval_timeout: DEFAULT_RETRIEVAL_TIMEOUT,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    pub fn with_knowledge(mut self, knowledge: Option<KnowledgeBase>) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_timeouts(mut self, retrieval: Duration, generation: Duration) -> Self {
        self.retrieval_timeout = retrieval;
        self.generation_timeout = generation;
        self
    }

    pub fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    pub fn search(&self) -> &ServiceHandle<V> {
        &self.search
    }

    pub fn generator(&self) -> &ServiceHandle<G> {
        &self.generator
    }

    /// Answer one query. Never fails: every collaborator failure degrades
    /// to a safe fallback with an honest confidence.
    pub async fn answer(&self, query: &Query) -> PipelineResponse {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        let table = self.patterns.snapshot();

        let decision = classify_query(&table, &query.text, query.upstream_intent.as_deref());
        tracing::info!(
            %request_id,
            query_type = %decision.query_type,
            emergency = decision.emergency_flag,
            confidence = decision.confidence,
            "Query classified"
        );

        let results = RetrievalCoordinator::new(&table, self.search.get(), self.retrieval_timeout)
            .with_knowledge(self.knowledge.as_ref())
            .retrieve(&query.text, &decision, query.metadata_filter.as_ref())
            .await;

        let draft = AnswerSynthesizer::new(self.generator.get(), self.generation_timeout)
            .synthesize(&query.text, &results, decision.query_type)
            .await;

        let validation =
            SafetyValidator::new(&table).validate(&draft.text, &draft.sources, decision.query_type);

        // Never report more confidence than the evidence supports.
        let confidence_score = if validation.is_safe {
            validation.confidence_score.min(draft.preliminary_confidence)
        } else {
            0.0
        };
        let sources = if validation.is_safe { draft.sources } else { Vec::new() };
        let emergency_flag = decision.emergency_flag || validation.level == SafetyLevel::Emergency;

        tracing::info!(
            %request_id,
            query_type = %decision.query_type,
            level = %validation.level,
            documents = results.len(),
            confidence = confidence_score,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query answered"
        );

        PipelineResponse {
            request_id,
            answer: validation.final_text,
            sources,
            query_type: decision.query_type,
            confidence_score,
            emergency_flag,
            warnings: validation.warnings,
            safety_level: validation.level,
            sources_verified: validation.sources_verified,
            recommendations: validation.recommendations,
            patterns_version: table.version.clone(),
        }
    }

    /// Like [`answer`](Self::answer), but aborts pending collaborator calls
    /// when the token is cancelled.
    pub async fn answer_cancellable(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<PipelineResponse, PipelineError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Query cancelled before completion");
                Err(PipelineError::Cancelled)
            }
            response = self.answer(query) => Ok(response),
        }
    }
}
