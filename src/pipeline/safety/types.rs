use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome category of the safety cascade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Safe,
    Warning,
    Unsafe,
    Emergency,
}

impl SafetyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Warning => "warning",
            Self::Unsafe => "unsafe",
            Self::Emergency => "emergency",
        }
    }

    /// Adjustment applied to the base confidence for this level.
    pub fn confidence_adjustment(&self) -> f32 {
        match self {
            Self::Safe => 0.0,
            Self::Warning => -0.1,
            Self::Unsafe => -0.8,
            Self::Emergency => 0.2,
        }
    }
}

impl std::fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the validator decided about one draft answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub level: SafetyLevel,
    pub is_safe: bool,
    /// The (possibly rewritten, wrapped or replaced) text to show.
    pub final_text: String,
    pub warnings: Vec<String>,
    pub sources_verified: bool,
    /// In [0, 1].
    pub confidence_score: f32,
    pub recommendations: Vec<String>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Source {source_name} has invalid confidence {value}")]
    InvalidSourceConfidence { source_name: String, value: f32 },

    #[error("Validator internal error: {0}")]
    InternalError(String),
}

/// Base confidence before level, source and disclaimer adjustments.
pub const BASE_CONFIDENCE: f32 = 0.8;

/// Marker looked for (case-insensitive) when scoring disclaimers.
pub const DISCLAIMER_MARKER: &str = "medical disclaimer";

pub const SAFE_FALLBACK_MESSAGE: &str = "I'm unable to provide specific medical advice. For your safety, consult a qualified healthcare professional for personalized guidance.";

pub const EMERGENCY_BANNER: &str = "**MEDICAL EMERGENCY!**";

pub const EMERGENCY_ACTIONS: &str = "**IMMEDIATE ACTIONS:**\n\
• Call emergency services now (911/999/112)\n\
• Do not delay seeking professional help\n\
• Follow responder instructions";

// Warning and recommendation strings

pub const WARN_HARMFUL_ADVICE: &str = "potentially harmful medical advice detected";
pub const WARN_EMERGENCY: &str = "emergency situation detected";
pub const WARN_MODIFIED: &str = "safety modifications applied";
pub const WARN_UNVERIFIED_SOURCES: &str = "incomplete source verification";

pub const REC_CONSULT_PROFESSIONAL: &str = "consult a medical professional";
pub const REC_SEEK_ATTENTION: &str = "seek immediate medical attention";
pub const REC_QUALIFIERS_ADDED: &str = "added qualifiers and disclaimers";
pub const REC_VERIFY_SOURCES: &str = "verify source credibility";
pub const REC_DISCLAIMER_ADDED: &str = "added medical disclaimer";
pub const REC_MANUAL_REVIEW: &str = "manual review required";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&SafetyLevel::Emergency).unwrap(), "\"emergency\"");
        assert_eq!(SafetyLevel::Warning.to_string(), "warning");
    }

    #[test]
    fn adjustments_match_levels() {
        assert_eq!(SafetyLevel::Safe.confidence_adjustment(), 0.0);
        assert!(SafetyLevel::Warning.confidence_adjustment() < 0.0);
        assert!(SafetyLevel::Unsafe.confidence_adjustment() < SafetyLevel::Warning.confidence_adjustment());
        assert!(SafetyLevel::Emergency.confidence_adjustment() > 0.0);
    }

    #[test]
    fn fallback_points_to_professionals() {
        assert!(SAFE_FALLBACK_MESSAGE.contains("healthcare"));
        assert!(SAFE_FALLBACK_MESSAGE.contains("professional"));
    }
}
