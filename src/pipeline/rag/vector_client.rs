//! HTTP client for the external vector-search service.

use serde::{Deserialize, Serialize};

use super::types::{MetadataFilter, RetrievedDocument, ScoredDocument, VectorSearch};
use super::RagError;

pub struct HttpVectorSearch {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    matches: Vec<SearchMatch>,
}

#[derive(Deserialize)]
struct SearchMatch {
    #[serde(flatten)]
    document: RetrievedDocument,
    score: f32,
}

impl HttpVectorSearch {
    pub fn new(base_url: &str) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RagError::VectorSearch(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Create a client and confirm the service answers its health check.
    pub async fn connect(base_url: &str) -> Result<Self, RagError> {
        let search = Self::new(base_url)?;
        let url = format!("{}/health", search.base_url);
        let response = search
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RagError::VectorSearch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RagError::VectorSearch(format!(
                "health check returned {}",
                response.status().as_u16()
            )));
        }
        tracing::info!(url = %search.base_url, "Vector search service reachable");
        Ok(search)
    }
}

impl VectorSearch for HttpVectorSearch {
    async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredDocument>, RagError> {
        let url = format!("{}/search", self.base_url);
        let body = SearchRequest {
            query: query_text,
            top_k,
            filter: filter.map(MetadataFilter::to_query_json),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::VectorSearch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagError::VectorSearch(format!("status {}", status.as_u16())));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| RagError::ResponseParsing(e.to_string()))?;

        tracing::debug!(matches = parsed.matches.len(), top_k, "Vector search returned");
        Ok(parsed
            .matches
            .into_iter()
            .take(top_k)
            .map(|m| ScoredDocument {
                document: m.document,
                score: m.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn fake_index() -> Router {
        Router::new()
            .route("/health", get(|| async { StatusCode::OK }))
            .route(
                "/search",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["top_k"], json!(3));
                    assert_eq!(body["filter"]["category"]["$eq"], json!("interaction"));
                    Json(json!({
                        "matches": [{
                            "id": "doc-1",
                            "content": "Ibuprofen with alcohol raises bleeding risk.",
                            "source": "drugbank",
                            "category": "interaction",
                            "confidence": 0.9,
                            "last_updated": "2024-02-01",
                            "score": 0.82
                        }]
                    }))
                }),
            )
    }

    #[tokio::test]
    async fn search_sends_filter_and_parses_matches() {
        let url = serve(fake_index()).await;
        let search = HttpVectorSearch::connect(&url).await.unwrap();
        let hits = search
            .search("ibuprofen alcohol", 3, Some(&MetadataFilter::category("interaction")))
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, "doc-1");
        assert_eq!(hits[0].document.source, "drugbank");
        assert_eq!(hits[0].document.last_updated, Some("2024-02-01".parse().unwrap()));
        assert!((hits[0].score - 0.82).abs() < 1e-6);
    }

    #[tokio::test]
    async fn server_error_is_vector_search_error() {
        let app = Router::new().route(
            "/search",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let url = serve(app).await;
        let search = HttpVectorSearch::new(&url).unwrap();
        let err = search.search("anything", 3, None).await.unwrap_err();
        assert!(matches!(err, RagError::VectorSearch(_)));
    }

    #[tokio::test]
    async fn connect_fails_without_health_endpoint() {
        let url = serve(Router::new()).await;
        assert!(HttpVectorSearch::connect(&url).await.is_err());
    }
}
