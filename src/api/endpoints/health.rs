//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;
use crate::pipeline::rag::types::{LlmGenerate, VectorSearch};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub patterns_version: String,
    pub vector_search: String,
    pub generation: String,
}

/// `GET /api/health` reports liveness and collaborator availability.
///
/// Always `ok`: the pipeline answers (with fallbacks) even when both
/// collaborators are down.
pub async fn check<V: VectorSearch, G: LlmGenerate>(
    State(ctx): State<ApiContext<V, G>>,
) -> Json<HealthResponse> {
    let pipeline = &ctx.pipeline;

    Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        patterns_version: pipeline.patterns().snapshot().version.clone(),
        vector_search: pipeline.search().status(),
        generation: pipeline.generator().status(),
    })
}
