use crate::pipeline::patterns::PatternTable;
use crate::pipeline::rag::types::SourceAttribution;

use super::types::SafetyError;

/// Check the credibility of a batch of sources.
///
/// True iff the batch is non-empty, every source meets the confidence
/// threshold, and at least the configured ratio of sources is whitelisted.
/// One low-confidence source fails the whole batch.
pub fn verify_sources(
    table: &PatternTable,
    sources: &[SourceAttribution],
) -> Result<bool, SafetyError> {
    if sources.is_empty() {
        return Ok(false);
    }

    for source in sources {
        if !source.confidence.is_finite() {
            return Err(SafetyError::InvalidSourceConfidence {
                source_name: source.source.clone(),
                value: source.confidence,
            });
        }
    }

    if sources
        .iter()
        .any(|s| s.confidence < table.verification_min_confidence)
    {
        return Ok(false);
    }

    let whitelisted = sources.iter().filter(|s| is_credible(table, &s.source)).count();
    Ok(whitelisted as f32 >= sources.len() as f32 * table.verification_ratio)
}

/// Substring match of the lowercased name against the whitelist.
pub fn is_credible(table: &PatternTable, source: &str) -> bool {
    let lower = source.to_lowercase();
    table
        .credible_sources
        .iter()
        .any(|credible| lower.contains(credible.as_str()))
}

/// Mean confidence of the sources, `None` when there are none.
pub fn mean_confidence(sources: &[SourceAttribution]) -> Option<f32> {
    if sources.is_empty() {
        return None;
    }
    Some(sources.iter().map(|s| s.confidence).sum::<f32>() / sources.len() as f32)
}
