use crate::pipeline::patterns::PatternTable;

use super::types::{QueryType, RoutingDecision};

pub const EMERGENCY_STRATEGY: &str = "emergency_protocol";
const FALLBACK_STRATEGY: &str = "hybrid_search";
const FALLBACK_K: usize = 5;

/// Classify a query into a routing decision.
///
/// Priority: emergency patterns, then the upstream intent mapping, then the
/// category cascade in table order, then general health. Never fails.
pub fn classify_query(
    table: &PatternTable,
    query: &str,
    upstream_intent: Option<&str>,
) -> RoutingDecision {
    // Emergency detection runs before the upstream intent is looked at.
    if table.emergency.is_match(query) {
        return emergency_decision(table.emergency_confidence);
    }

    if let Some(query_type) = upstream_intent.and_then(|intent| table.intent_type(intent)) {
        return routed_decision(table, query_type, table.intent_confidence);
    }

    if let Some(category) = table
        .categories
        .iter()
        .find(|category| category.matcher.is_match(query))
    {
        return routed_decision(table, category.query_type, category.confidence);
    }

    routed_decision(table, QueryType::GeneralHealth, table.default_confidence)
}

/// Decision for the emergency protocol. Always a single result.
pub fn emergency_decision(confidence: f32) -> RoutingDecision {
    RoutingDecision {
        query_type: QueryType::Emergency,
        confidence,
        retrieval_strategy: EMERGENCY_STRATEGY.to_string(),
        emergency_flag: true,
        recommended_k: 1,
        category_filter: None,
    }
}

fn routed_decision(table: &PatternTable, query_type: QueryType, confidence: f32) -> RoutingDecision {
    let (strategy, k, category_filter) = match table.route(query_type) {
        Some(route) => (
            route.strategy.clone(),
            route.recommended_k,
            route.category_filter.clone(),
        ),
        None => (FALLBACK_STRATEGY.to_string(), FALLBACK_K, None),
    };

    RoutingDecision {
        query_type,
        confidence,
        retrieval_strategy: strategy,
        emergency_flag: false,
        recommended_k: k,
        category_filter,
    }
}
