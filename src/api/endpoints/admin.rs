//! Administrative endpoints.

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ReloadResponse};
use crate::pipeline::rag::types::{LlmGenerate, VectorSearch};

/// `POST /api/admin/reload` re-reads the pattern file.
///
/// In-flight requests finish on the table they started with. A file that
/// fails to load or compile leaves the current table active.
pub async fn reload_patterns<V: VectorSearch, G: LlmGenerate>(
    State(ctx): State<ApiContext<V, G>>,
) -> Result<Json<ReloadResponse>, ApiError> {
    let store = ctx.pipeline.patterns();
    let patterns_version = store.reload().map_err(|e| {
        tracing::warn!(error = %e, "Pattern reload rejected, keeping current table");
        ApiError::from(e)
    })?;

    Ok(Json(ReloadResponse { patterns_version }))
}
