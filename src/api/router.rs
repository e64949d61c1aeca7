//! API router.
//!
//! Returns a composable `Router` with every route under `/api/`.

use axum::routing::{get, post};
use axum::Router;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::pipeline::rag::types::{LlmGenerate, VectorSearch};

/// Build the API router.
///
/// Handlers use `State<ApiContext>`; `.with_state()` turns the inner
/// router into `Router<()>` so it can be nested and served.
pub fn api_router<V, G>(ctx: ApiContext<V, G>) -> Router
where
    V: VectorSearch + 'static,
    G: LlmGenerate + 'static,
{
    let api = Router::new()
        .route("/health", get(endpoints::health::check::<V, G>))
        .route("/query", post(endpoints::query::answer::<V, G>))
        .route("/admin/reload", post(endpoints::admin::reload_patterns::<V, G>))
        .with_state(ctx);

    Router::new().nest("/api", api)
}
