use super::types::{QueryType, RetrievalResult};

/// Number of retrieved results included in a prompt.
pub const PROMPT_SOURCES: usize = 3;

pub const NO_RESULTS_RESPONSE: &str = "I couldn't find specific information about your query. Please consult a doctor or another healthcare professional.";

pub const GENERATION_FAILED_RESPONSE: &str =
    "I'm unable to provide a response at this time. Please consult a healthcare professional.";

pub const EMERGENCY_RESPONSE: &str = "⚠️ MEDICAL EMERGENCY DETECTED ⚠️\n\nPlease call emergency services immediately (911 in US, 999 in UK, 112 in EU) or go to the nearest emergency room. Do not delay seeking immediate medical attention.";

const CLOSING_RULES: &str = "Remember to:
1. Base your response on the provided context
2. Include a disclaimer about consulting healthcare professionals
3. Be clear and easy to understand
4. Cite sources when possible
5. Never provide definitive medical diagnoses

Response:";

/// Generation guidance per query type.
pub fn instructions_for(query_type: QueryType) -> &'static str {
    match query_type {
        QueryType::DrugInteraction => "Focus on drug interactions, safety concerns, and contraindications. Always recommend consulting a pharmacist or doctor for drug combinations.",
        QueryType::SymptomCheck => "Provide general information about symptoms and when to seek medical care. Never provide definitive diagnoses. Include warning signs that require immediate medical attention.",
        QueryType::MedicationInfo => "Provide factual information about medications including uses, side effects, and precautions. Always remind the user to follow their doctor's instructions.",
        QueryType::ChronicCare => "Focus on evidence-based management strategies, lifestyle modifications, and monitoring recommendations. Emphasize the importance of working with healthcare providers.",
        QueryType::MentalHealth => "Provide supportive information and coping strategies. Include crisis resources when appropriate. Never provide therapy or replace professional mental health care.",
        QueryType::Diagnostic => "Explain what tests measure and normal ranges when available. Emphasize that interpretation should be done by healthcare professionals.",
        QueryType::GeneralHealth => "Provide general health information while emphasizing the importance of personalized medical advice.",
        QueryType::Emergency => "Direct the user to emergency services immediately.",
    }
}

/// Numbered source blocks, one per result, separated by blank lines.
pub fn format_context(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("Source {}: {}", i + 1, r.context_snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the generation prompt from the question, its type, and the
/// context blocks.
pub fn build_prompt(query: &str, query_type: QueryType, context: &str) -> String {
    format!(
        "Based on the following medical information sources, please provide a helpful and accurate response to the user's question.\n\n\
         User Question: {query}\n\n\
         Medical Context:\n{context}\n\n\
         Instructions: {}\n\n\
         {CLOSING_RULES}",
        instructions_for(query_type)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rag::types::RetrievedDocument;
    use std::collections::HashMap;

    fn result(snippet: &str) -> RetrievalResult {
        RetrievalResult {
            document: RetrievedDocument {
                id: "d".into(),
                content: snippet.into(),
                source: "cdc".into(),
                category: "general".into(),
                confidence: 0.9,
                last_updated: None,
                metadata: HashMap::new(),
            },
            relevance_score: 0.8,
            context_snippet: snippet.into(),
        }
    }

    #[test]
    fn context_numbers_sources_from_one() {
        let context = format_context(&[result("first"), result("second")]);
        assert_eq!(context, "Source 1: first\n\nSource 2: second");
    }

    #[test]
    fn prompt_contains_question_context_and_rules() {
        let prompt = build_prompt(
            "can I take ibuprofen with alcohol",
            QueryType::DrugInteraction,
            "Source 1: bleeding risk",
        );
        assert!(prompt.contains("User Question: can I take ibuprofen with alcohol"));
        assert!(prompt.contains("Medical Context:\nSource 1: bleeding risk"));
        assert!(prompt.contains("consulting a pharmacist or doctor"));
        assert!(prompt.contains("5. Never provide definitive medical diagnoses"));
        assert!(prompt.ends_with("Response:"));
    }

    #[test]
    fn every_type_has_instructions() {
        for qt in [
            QueryType::Emergency,
            QueryType::DrugInteraction,
            QueryType::SymptomCheck,
            QueryType::MedicationInfo,
            QueryType::ChronicCare,
            QueryType::MentalHealth,
            QueryType::Diagnostic,
            QueryType::GeneralHealth,
        ] {
            assert!(!instructions_for(qt).is_empty());
        }
    }

    #[test]
    fn canned_responses_point_to_professionals() {
        assert!(NO_RESULTS_RESPONSE.contains("doctor"));
        assert!(GENERATION_FAILED_RESPONSE.contains("healthcare professional"));
        assert!(EMERGENCY_RESPONSE.contains("911"));
    }
}
