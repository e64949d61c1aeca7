use std::borrow::Cow;

use crate::pipeline::patterns::PatternTable;

/// Which validator pattern sets matched a text. Holds pattern indices only,
/// never matched text, so it can be logged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    pub critical: Vec<usize>,
    pub emergency: Vec<usize>,
    pub warning: Vec<usize>,
}

impl ScanReport {
    pub fn is_critical(&self) -> bool {
        !self.critical.is_empty()
    }

    pub fn is_emergency(&self) -> bool {
        !self.emergency.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warning.is_empty()
    }
}

/// Run all three validator pattern sets over the text.
///
/// The critical set sees the text with cautionary phrasing removed.
pub fn scan(table: &PatternTable, text: &str) -> ScanReport {
    let screened = without_exempt_phrases(table, text);
    ScanReport {
        critical: table.critical.matches(&screened).into_iter().collect(),
        emergency: table.emergency_indicators.matches(text).into_iter().collect(),
        warning: table.warning.matches(text).into_iter().collect(),
    }
}

/// Blank out every critical-exempt match ("do not stop", "before you double").
fn without_exempt_phrases<'t>(table: &PatternTable, text: &'t str) -> Cow<'t, str> {
    let mut screened = Cow::Borrowed(text);
    for pattern in &table.critical_exempt {
        if pattern.is_match(&screened) {
            screened = Cow::Owned(pattern.replace_all(&screened, " ").into_owned());
        }
    }
    screened
}

/// Number of distinct disclaimer keywords present in the text.
pub fn disclaimer_keyword_count(table: &PatternTable, text: &str) -> usize {
    let lower = text.to_lowercase();
    table
        .disclaimer_keywords
        .iter()
        .filter(|k| lower.contains(k.as_str()))
        .count()
}

/// Whether the text already carries enough cautionary language.
pub fn has_disclaimer_language(table: &PatternTable, text: &str) -> bool {
    disclaimer_keyword_count(table, text) >= table.disclaimer_min_keywords
}
