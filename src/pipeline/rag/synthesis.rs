use std::time::Duration;

use super::prompt::{
    build_prompt, format_context, EMERGENCY_RESPONSE, GENERATION_FAILED_RESPONSE,
    NO_RESULTS_RESPONSE, PROMPT_SOURCES,
};
use super::retrieval::EMERGENCY_PROTOCOL_SOURCE;
use super::types::{GeneratedAnswer, LlmGenerate, QueryType, RetrievalResult, SourceAttribution};
use super::RagError;

pub const FALLBACK_CONFIDENCE: f32 = 0.1;

/// Drafts an answer from ranked evidence.
///
/// `generator` is `None` when the generation collaborator is unavailable;
/// such requests get the generation-failed fallback.
pub struct AnswerSynthesizer<'a, G: LlmGenerate> {
    generator: Option<&'a G>,
    timeout: Duration,
}

impl<'a, G: LlmGenerate> AnswerSynthesizer<'a, G> {
    pub fn new(generator: Option<&'a G>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub async fn synthesize(
        &self,
        query: &str,
        results: &[RetrievalResult],
        query_type: QueryType,
    ) -> GeneratedAnswer {
        if results.is_empty() {
            return fallback(NO_RESULTS_RESPONSE);
        }

        if query_type == QueryType::Emergency {
            return emergency_answer();
        }

        let used = &results[..results.len().min(PROMPT_SOURCES)];
        let prompt = build_prompt(query, query_type, &format_context(used));

        match self.generate(&prompt).await {
            Ok(text) => GeneratedAnswer {
                text,
                sources: used.iter().map(SourceAttribution::from_result).collect(),
                preliminary_confidence: preliminary_confidence(used),
            },
            Err(e) => {
                tracing::warn!(error = %e, query_type = %query_type, "Generation failed, using fallback answer");
                fallback(GENERATION_FAILED_RESPONSE)
            }
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let generator = self.generator.ok_or(RagError::Unavailable("generation"))?;
        let text = tokio::time::timeout(self.timeout, generator.complete(prompt))
            .await
            .map_err(|_| RagError::Timeout {
                service: "generation",
                millis: self.timeout.as_millis(),
            })??;

        if text.trim().is_empty() {
            return Err(RagError::ResponseParsing("empty completion".into()));
        }
        Ok(text.trim().to_string())
    }
}

/// Mean of average relevance and average source confidence.
pub fn preliminary_confidence(results: &[RetrievalResult]) -> f32 {
    if results.is_empty() {
        return 0.0;
    }
    let n = results.len() as f32;
    let relevance = results.iter().map(|r| r.relevance_score).sum::<f32>() / n;
    let confidence = results.iter().map(|r| r.document.confidence).sum::<f32>() / n;
    let mean = (relevance + confidence) / 2.0;
    if mean.is_finite() {
        mean.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn fallback(text: &str) -> GeneratedAnswer {
    GeneratedAnswer {
        text: text.to_string(),
        sources: Vec::new(),
        preliminary_confidence: FALLBACK_CONFIDENCE,
    }
}

fn emergency_answer() -> GeneratedAnswer {
    GeneratedAnswer {
        text: EMERGENCY_RESPONSE.to_string(),
        sources: vec![SourceAttribution {
            source: EMERGENCY_PROTOCOL_SOURCE.to_string(),
            category: "emergency".into(),
            confidence: 1.0,
            relevance: Some(1.0),
            last_updated: None,
        }],
        preliminary_confidence: 1.0,
    }
}
