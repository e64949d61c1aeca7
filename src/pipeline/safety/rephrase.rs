use regex::Captures;

use crate::pipeline::patterns::RephraseRule;

/// Rewrite directive or speculative phrasing into hedged language.
///
/// Rules apply in order, each over the output of the previous one.
/// Replacement templates may reference capture groups (`$1`). A match that
/// starts with a capital letter yields a capitalized replacement.
pub fn hedge_phrasing(rules: &[RephraseRule], text: &str) -> String {
    let mut result = text.to_string();
    let mut applied = 0usize;

    for rule in rules {
        if rule.pattern.is_match(&result) {
            result = rule
                .pattern
                .replace_all(&result, |caps: &Captures| {
                    let mut replacement = String::new();
                    caps.expand(&rule.replacement, &mut replacement);
                    match_leading_case(&caps[0], replacement)
                })
                .into_owned();
            applied += 1;
        }
    }

    tracing::debug!(rules_applied = applied, "Hedging rules applied");
    result
}

fn match_leading_case(matched: &str, replacement: String) -> String {
    let starts_upper = matched.chars().next().is_some_and(char::is_uppercase);
    let mut chars = replacement.chars();
    match chars.next() {
        Some(first) if starts_upper && first.is_lowercase() => {
            first.to_uppercase().chain(chars).collect()
        }
        _ => replacement,
    }
}
