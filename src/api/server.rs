//! Server lifecycle: build the pipeline from configuration, bind, serve,
//! shut down gracefully.
//!
//! bind → spawn background task → return handle with shutdown token.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::router::api_router;
use crate::api::types::ApiContext;
use crate::config::AppConfig;
use crate::pipeline::orchestrator::{Pipeline, ServiceHandle};
use crate::pipeline::patterns::{PatternError, PatternStore, PatternTable};
use crate::pipeline::rag::knowledge::KnowledgeBase;
use crate::pipeline::rag::ollama::OllamaGenerator;
use crate::pipeline::rag::types::{LlmGenerate, VectorSearch};
use crate::pipeline::rag::vector_client::HttpVectorSearch;
use crate::pipeline::rag::RagError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Pattern table could not be loaded: {0}")]
    Patterns(#[from] PatternError),
}

/// The production pipeline type.
pub type ServerPipeline = Pipeline<HttpVectorSearch, OllamaGenerator>;

// ═══════════════════════════════════════════════════════════
// Pipeline construction
// ═══════════════════════════════════════════════════════════

/// Build the pipeline from configuration.
///
/// A bad pattern file is fatal. Collaborators that cannot be reached, and a
/// knowledge base that cannot be read, are logged and left unavailable.
pub async fn build_pipeline(config: &AppConfig) -> Result<ServerPipeline, ServerError> {
    let patterns = match &config.patterns_path {
        Some(path) => {
            let store = PatternStore::from_file(path)?;
            tracing::info!(
                path = %path.display(),
                version = %store.snapshot().version,
                "Pattern table loaded"
            );
            store
        }
        None => {
            tracing::info!("Using built-in pattern table");
            PatternStore::new(PatternTable::builtin())
        }
    };

    let knowledge = match &config.knowledge_path {
        Some(path) => match KnowledgeBase::load(path) {
            Ok(kb) => Some(kb),
            Err(e) => {
                tracing::warn!(error = %e, "Knowledge base unavailable, continuing without it");
                None
            }
        },
        None => None,
    };

    let search = match &config.vector_url {
        Some(url) => ServiceHandle::from_result("vector_search", HttpVectorSearch::connect(url).await),
        None => ServiceHandle::from_result::<RagError>(
            "vector_search",
            Err(RagError::Unavailable("vector search (MEDGUARD_VECTOR_URL not set)")),
        ),
    };

    let generator = ServiceHandle::from_result(
        "generation",
        OllamaGenerator::connect(&config.ollama_url, &config.model).await,
    );

    Ok(Pipeline::new(patterns, search, generator)
        .with_knowledge(knowledge)
        .with_timeouts(config.retrieval_timeout, config.generation_timeout))
}

// ═══════════════════════════════════════════════════════════
// Server lifecycle
// ═══════════════════════════════════════════════════════════

/// Handle to a running server.
pub struct ApiServer {
    pub addr: SocketAddr,
    pub started_at: String,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ApiServer {
    /// Stop accepting connections and cancel in-flight queries.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        tracing::info!("API server shutdown signal sent");
    }

    /// Wait for the server task to finish.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "API server task failed");
        }
    }
}

/// Bind and serve the API in a background task.
pub async fn start_server<V, G>(pipeline: Pipeline<V, G>, bind: SocketAddr) -> Result<ApiServer, ServerError>
where
    V: VectorSearch + 'static,
    G: LlmGenerate + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|source| ServerError::Bind { addr: bind, source })?;
    let addr = listener
        .local_addr()
        .map_err(|source| ServerError::Bind { addr: bind, source })?;

    let shutdown = CancellationToken::new();
    let app = api_router(ApiContext::new(pipeline, shutdown.clone()));

    let signal = shutdown.clone();
    let task = tokio::spawn(async move {
        tracing::info!(%addr, "API server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await
        {
            tracing::error!("API server error: {e}");
        }

        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        addr,
        started_at: chrono::Utc::now().to_rfc3339(),
        shutdown,
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rag::retrieval::InMemoryVectorSearch;

    struct EchoLlm;

    impl LlmGenerate for EchoLlm {
        async fn complete(&self, _prompt: &str) -> Result<String, RagError> {
            Ok("Drink water regularly. Consult your doctor about specific needs.".into())
        }
    }

    fn test_pipeline() -> Pipeline<InMemoryVectorSearch, EchoLlm> {
        Pipeline::new(
            PatternStore::new(PatternTable::builtin()),
            ServiceHandle::Available(InMemoryVectorSearch::new()),
            ServiceHandle::Available(EchoLlm),
        )
    }

    #[tokio::test]
    async fn start_serve_and_stop() {
        let server = start_server(test_pipeline(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert_ne!(server.addr.port(), 0);

        let url = format!("http://{}/api/health", server.addr);
        let body: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(body["status"], "ok");

        server.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), server.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn build_pipeline_degrades_without_collaborators() {
        // Nothing listens on port 9; both collaborators end up unavailable.
        let config = AppConfig::from_lookup(|key| match key {
            "MEDGUARD_OLLAMA_URL" => Some("http://127.0.0.1:9".into()),
            _ => None,
        })
        .unwrap();
        let config = AppConfig {
            patterns_path: None,
            ..config
        };

        let pipeline = build_pipeline(&config).await.unwrap();
        assert!(!pipeline.search().is_available());
        assert!(!pipeline.generator().is_available());
        assert_eq!(pipeline.patterns().snapshot().version, "builtin-1");
    }

    #[tokio::test]
    async fn bad_pattern_file_is_fatal() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{ not json").unwrap();
        let config = AppConfig::from_lookup(|key| match key {
            "MEDGUARD_OLLAMA_URL" => Some("http://127.0.0.1:9".into()),
            _ => None,
        })
        .unwrap();
        let config = AppConfig {
            patterns_path: Some(file.path().to_path_buf()),
            ..config
        };

        assert!(matches!(
            build_pipeline(&config).await,
            Err(ServerError::Patterns(_))
        ));
    }
}
