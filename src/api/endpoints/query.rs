//! Query endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, QueryRequest, QueryResponse};
use crate::pipeline::rag::types::{LlmGenerate, VectorSearch};

/// `POST /api/query` runs one query through the pipeline.
///
/// A client disconnect drops this future, which drops any pending
/// collaborator call for this request only.
pub async fn answer<V: VectorSearch, G: LlmGenerate>(
    State(ctx): State<ApiContext<V, G>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = payload?;
    let query = request.into_query().map_err(ApiError::BadRequest)?;

    let cancel = ctx.shutdown.child_token();
    let response = ctx.pipeline.answer_cancellable(&query, &cancel).await?;

    Ok(Json(QueryResponse::from(response)))
}
