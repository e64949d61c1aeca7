use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::pipeline::patterns::PatternTable;
use crate::pipeline::rag::types::{QueryType, SourceAttribution};

use super::disclaimer::{append_disclaimer, disclaimer_for};
use super::keywords::{has_disclaimer_language, scan, ScanReport};
use super::rephrase::hedge_phrasing;
use super::sources::{mean_confidence, verify_sources};
use super::types::*;

/// Validates every draft answer before it reaches the user.
///
/// Cascade: critical patterns block, emergency indicators escalate,
/// warning patterns soften; then sources are verified, a disclaimer is
/// added when the text lacks cautionary language, and confidence is scored.
/// Never fails: internal errors degrade to the blocking fallback.
pub struct SafetyValidator<'a> {
    table: &'a PatternTable,
}

impl<'a> SafetyValidator<'a> {
    pub fn new(table: &'a PatternTable) -> Self {
        Self { table }
    }

    pub fn validate(
        &self,
        text: &str,
        sources: &[SourceAttribution],
        query_type: QueryType,
    ) -> ValidationResult {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.run_cascade(text, sources, query_type)));

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Validation failed, blocking response");
                self.internal_failure(&e.to_string())
            }
            Err(_) => {
                tracing::error!("Validator panicked, blocking response");
                self.internal_failure("validator panicked")
            }
        };

        log_validation(&result, query_type);
        result
    }

    fn run_cascade(
        &self,
        text: &str,
        sources: &[SourceAttribution],
        query_type: QueryType,
    ) -> Result<ValidationResult, SafetyError> {
        let report = scan(self.table, text);
        log_scan(&report);

        if report.is_critical() {
            return Ok(self.blocked(
                vec![WARN_HARMFUL_ADVICE.to_string()],
                vec![REC_CONSULT_PROFESSIONAL.to_string()],
            ));
        }

        if report.is_emergency() {
            return Ok(ValidationResult {
                level: SafetyLevel::Emergency,
                is_safe: true,
                final_text: wrap_emergency(text),
                warnings: vec![WARN_EMERGENCY.to_string()],
                // Escalation stands even when the attributions are malformed.
                sources_verified: verify_sources(self.table, sources).unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Source verification failed on emergency path");
                    false
                }),
                confidence_score: 1.0,
                recommendations: vec![REC_SEEK_ATTENTION.to_string()],
            });
        }

        let mut warnings = Vec::new();
        let mut recommendations = Vec::new();

        let (level, mut final_text) = if report.has_warnings() {
            warnings.push(WARN_MODIFIED.to_string());
            recommendations.push(REC_QUALIFIERS_ADDED.to_string());
            (SafetyLevel::Warning, hedge_phrasing(&self.table.rephrase, text))
        } else {
            (SafetyLevel::Safe, text.to_string())
        };

        let sources_verified = verify_sources(self.table, sources)?;
        if !sources.is_empty() && !sources_verified {
            warnings.push(WARN_UNVERIFIED_SOURCES.to_string());
            recommendations.push(REC_VERIFY_SOURCES.to_string());
        }

        // Judged on the draft as written, before any hedging.
        if !has_disclaimer_language(self.table, text) {
            final_text = append_disclaimer(&final_text, disclaimer_for(self.table, query_type));
            recommendations.push(REC_DISCLAIMER_ADDED.to_string());
        }

        let confidence_score = confidence_score(level, sources, &final_text);

        Ok(ValidationResult {
            level,
            is_safe: true,
            final_text,
            warnings,
            sources_verified,
            confidence_score,
            recommendations,
        })
    }

    fn blocked(&self, warnings: Vec<String>, recommendations: Vec<String>) -> ValidationResult {
        ValidationResult {
            level: SafetyLevel::Unsafe,
            is_safe: false,
            final_text: safe_fallback(self.table),
            warnings,
            sources_verified: false,
            confidence_score: 0.0,
            recommendations,
        }
    }

    fn internal_failure(&self, reason: &str) -> ValidationResult {
        self.blocked(
            vec![format!("validation failed: {reason}")],
            vec![REC_MANUAL_REVIEW.to_string()],
        )
    }
}

/// The text shown in place of a blocked answer.
pub fn safe_fallback(table: &PatternTable) -> String {
    append_disclaimer(SAFE_FALLBACK_MESSAGE, &table.disclaimers.general)
}

pub fn wrap_emergency(text: &str) -> String {
    format!("{EMERGENCY_BANNER}\n\n{text}\n\n{EMERGENCY_ACTIONS}")
}

/// Score in [0, 1] from the level, the sources and the final text.
pub fn confidence_score(level: SafetyLevel, sources: &[SourceAttribution], final_text: &str) -> f32 {
    let mut score = BASE_CONFIDENCE + level.confidence_adjustment();

    match mean_confidence(sources) {
        Some(mean) => score = (score + mean) / 2.0,
        None => score -= 0.1,
    }

    if final_text.to_lowercase().contains(DISCLAIMER_MARKER) {
        score += 0.05;
    }

    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn log_scan(report: &ScanReport) {
    tracing::debug!(
        critical = ?report.critical,
        emergency = ?report.emergency,
        warning = ?report.warning,
        "Safety scan"
    );
}

/// Log a validation outcome WITHOUT patient data.
fn log_validation(result: &ValidationResult, query_type: QueryType) {
    match result.level {
        SafetyLevel::Safe => {
            tracing::info!(
                level = "safe",
                query_type = %query_type,
                sources_verified = result.sources_verified,
                confidence = result.confidence_score,
                "Safety validation passed"
            );
        }
        SafetyLevel::Warning => {
            tracing::warn!(
                level = "warning",
                query_type = %query_type,
                warning_count = result.warnings.len(),
                confidence = result.confidence_score,
                "Safety validation: phrasing softened"
            );
        }
        SafetyLevel::Unsafe => {
            tracing::warn!(
                level = "unsafe",
                query_type = %query_type,
                warnings = ?result.warnings,
                "Safety validation: response blocked"
            );
        }
        SafetyLevel::Emergency => {
            tracing::warn!(
                level = "emergency",
                query_type = %query_type,
                "Safety validation: emergency escalation"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str, confidence: f32) -> SourceAttribution {
        SourceAttribution {
            source: name.into(),
            category: "medication".into(),
            confidence,
            relevance: Some(0.8),
            last_updated: None,
        }
    }

    fn validate(text: &str, sources: &[SourceAttribution], qt: QueryType) -> ValidationResult {
        let table = PatternTable::builtin();
        SafetyValidator::new(&table).validate(text, sources, qt)
    }

    // =================================================================
    // CRITICAL
    // =================================================================

    #[test]
    fn stop_medication_is_unsafe_regardless_of_sources() {
        let text = "You should stop taking your medication immediately";
        for sources in [vec![], vec![source("cdc", 1.0), source("who", 1.0)]] {
            let result = validate(text, &sources, QueryType::MedicationInfo);
            assert_eq!(result.level, SafetyLevel::Unsafe);
            assert!(!result.is_safe);
            assert_eq!(result.confidence_score, 0.0);
            assert!(result.final_text.contains("healthcare"));
            assert!(result.final_text.contains("professional"));
            assert!(!result.final_text.contains("stop taking"));
            assert_eq!(result.warnings, vec![WARN_HARMFUL_ADVICE.to_string()]);
            assert!(!result.sources_verified);
        }
    }

    #[test]
    fn critical_beats_emergency() {
        let result = validate(
            "Call 911, then stop taking your medication.",
            &[],
            QueryType::GeneralHealth,
        );
        assert_eq!(result.level, SafetyLevel::Unsafe);
    }

    // =================================================================
    // EMERGENCY
    // =================================================================

    #[test]
    fn emergency_indicator_wraps_text() {
        let result = validate("Call 911 if you have chest pain.", &[], QueryType::SymptomCheck);
        assert_eq!(result.level, SafetyLevel::Emergency);
        assert!(result.is_safe);
        assert_eq!(result.confidence_score, 1.0);
        assert!(result.final_text.starts_with("**MEDICAL EMERGENCY!**"));
        assert!(result.final_text.contains("Call 911 if you have chest pain."));
        assert!(result.final_text.contains("Call emergency services now"));
        assert_eq!(result.recommendations, vec![REC_SEEK_ATTENTION.to_string()]);
    }

    #[test]
    fn emergency_takes_priority_over_warning() {
        let result = validate(
            "You should take aspirin and call 911 immediately.",
            &[],
            QueryType::Emergency,
        );
        assert_eq!(result.level, SafetyLevel::Emergency);
        // Not hedged: the emergency path keeps the draft verbatim.
        assert!(result.final_text.contains("You should take aspirin"));
    }

    #[test]
    fn emergency_reports_source_verification() {
        let result = validate(
            "Seek immediate medical attention.",
            &[source("Emergency Protocol", 1.0)],
            QueryType::Emergency,
        );
        assert_eq!(result.level, SafetyLevel::Emergency);
        assert!(result.sources_verified);
    }

    #[test]
    fn emergency_survives_invalid_source_confidence() {
        let result = validate(
            "Call 911 if you have chest pain.",
            &[source("cdc", f32::NAN)],
            QueryType::SymptomCheck,
        );
        assert_eq!(result.level, SafetyLevel::Emergency);
        assert!(result.is_safe);
        assert!(!result.sources_verified);
        assert!(result.final_text.contains("Call emergency services now"));
    }

    // =================================================================
    // CAUTIONARY PHRASING
    // =================================================================

    #[test]
    fn advice_against_stopping_or_overdosing_passes() {
        for text in [
            "Do not stop taking your medication without talking to your doctor.",
            "Never skip doses of your antibiotic.",
            "Do not take more than 4 grams of acetaminophen a day.",
        ] {
            let result = validate(text, &[source("medlineplus", 0.9)], QueryType::MedicationInfo);
            assert!(result.is_safe, "{text}");
            assert_ne!(result.level, SafetyLevel::Unsafe, "{text}");
            assert!(result.confidence_score > 0.0, "{text}");
            assert!(result.final_text.starts_with(text), "{text}");
        }
    }

    // =================================================================
    // WARNING
    // =================================================================

    #[test]
    fn warning_softens_and_adds_disclaimer() {
        let result = validate(
            "You should take ibuprofen with food.",
            &[source("drugbank", 0.9)],
            QueryType::MedicationInfo,
        );
        assert_eq!(result.level, SafetyLevel::Warning);
        assert!(result.is_safe);
        assert!(result
            .final_text
            .starts_with("You might consider discussing with your doctor whether to take ibuprofen"));
        assert!(result.final_text.contains("**Medical Disclaimer:**"));
        assert!(result.final_text.contains("pharmacist"));
        assert!(result.warnings.contains(&WARN_MODIFIED.to_string()));
        assert!(result.sources_verified);
        // (0.8 - 0.1 + 0.9) / 2 + 0.05
        assert!((result.confidence_score - 0.85).abs() < 1e-5);
    }

    #[test]
    fn disclaimer_check_uses_draft_text() {
        // Hedging introduces "doctor", but the draft itself has no
        // disclaimer keywords, so a disclaimer is still appended.
        let result = validate("Try taking it at night.", &[], QueryType::GeneralHealth);
        assert_eq!(result.level, SafetyLevel::Warning);
        assert!(result.final_text.contains("**Medical Disclaimer:**"));
    }

    // =================================================================
    // SAFE
    // =================================================================

    #[test]
    fn safe_text_gets_disclaimer_by_type() {
        let result = validate(
            "Headaches are often caused by tension.",
            &[],
            QueryType::SymptomCheck,
        );
        assert_eq!(result.level, SafetyLevel::Safe);
        assert!(result.final_text.starts_with("Headaches are often caused by tension."));
        assert!(result.final_text.contains("Symptom information is for awareness only"));
        assert!(result.recommendations.contains(&REC_DISCLAIMER_ADDED.to_string()));
        assert!(!result.sources_verified);
        assert!(result.warnings.is_empty());
        // 0.8 - 0.1 + 0.05
        assert!((result.confidence_score - 0.75).abs() < 1e-5);
    }

    #[test]
    fn existing_cautionary_language_skips_disclaimer() {
        let text = "Metformin may cause nausea. Consult your doctor about side effects.";
        let result = validate(text, &[], QueryType::MedicationInfo);
        assert_eq!(result.level, SafetyLevel::Safe);
        assert_eq!(result.final_text, text);
        // 0.8 - 0.1, no marker
        assert!((result.confidence_score - 0.7).abs() < 1e-5);
    }

    #[test]
    fn unverified_sources_add_warning() {
        let result = validate(
            "Statins lower cholesterol.",
            &[source("cdc", 0.9), source("forum", 0.69)],
            QueryType::ChronicCare,
        );
        assert_eq!(result.level, SafetyLevel::Safe);
        assert!(!result.sources_verified);
        assert!(result.warnings.contains(&WARN_UNVERIFIED_SOURCES.to_string()));
        assert!(result.recommendations.contains(&REC_VERIFY_SOURCES.to_string()));
    }

    #[test]
    fn no_sources_means_no_verification_warning() {
        let result = validate("Statins lower cholesterol.", &[], QueryType::ChronicCare);
        assert!(!result.warnings.contains(&WARN_UNVERIFIED_SOURCES.to_string()));
    }

    // =================================================================
    // FAILURE AND BOUNDS
    // =================================================================

    #[test]
    fn internal_error_degrades_to_blocked_fallback() {
        let result = validate(
            "Statins lower cholesterol.",
            &[source("cdc", f32::NAN)],
            QueryType::ChronicCare,
        );
        assert_eq!(result.level, SafetyLevel::Unsafe);
        assert!(!result.is_safe);
        assert_eq!(result.confidence_score, 0.0);
        assert!(result.final_text.contains("healthcare professional"));
        assert_eq!(result.recommendations, vec![REC_MANUAL_REVIEW.to_string()]);
        assert!(result.warnings[0].starts_with("validation failed"));
    }

    #[test]
    fn confidence_always_in_unit_range() {
        let levels = [
            SafetyLevel::Safe,
            SafetyLevel::Warning,
            SafetyLevel::Unsafe,
            SafetyLevel::Emergency,
        ];
        let source_sets = [
            vec![],
            vec![source("cdc", 0.0)],
            vec![source("cdc", 1.0), source("who", 1.0)],
        ];
        let texts = ["plain", "with **Medical Disclaimer:** marker"];

        for level in levels {
            for sources in &source_sets {
                for text in texts {
                    let score = confidence_score(level, sources, text);
                    assert!((0.0..=1.0).contains(&score), "{level:?} {sources:?} {text}");
                }
            }
        }
        // Emergency with perfect sources and marker would exceed 1.0 unclamped.
        assert_eq!(
            confidence_score(SafetyLevel::Emergency, &[source("cdc", 1.0)], "medical disclaimer"),
            1.0
        );
    }

    #[test]
    fn validator_is_deterministic() {
        let a = validate("You should take it daily.", &[source("cdc", 0.8)], QueryType::MedicationInfo);
        let b = validate("You should take it daily.", &[source("cdc", 0.8)], QueryType::MedicationInfo);
        assert_eq!(a, b);
    }
}
