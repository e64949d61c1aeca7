//! Generation collaborator backed by a local Ollama instance.

use serde::{Deserialize, Serialize};

use super::types::LlmGenerate;
use super::RagError;

/// Sent with every completion. Per-request instructions live in the prompt.
pub const SYSTEM_PROMPT: &str = "You are a careful medical information assistant. You are not a doctor. Answer only from the provided sources, never give a definitive diagnosis, and encourage the user to consult a healthcare professional.";

/// Ollama HTTP client bound to one model.
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RagError::OllamaConnection(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }

    /// Create a generator and confirm the model is installed.
    pub async fn connect(base_url: &str, model: &str) -> Result<Self, RagError> {
        let generator = Self::new(base_url, model)?;
        let models = generator.list_models().await?;
        if !models.iter().any(|m| m.starts_with(model)) {
            tracing::debug!(model = %model, available = models.len(), "Ollama model not installed");
            return Err(RagError::NoModel(model.to_string()));
        }
        tracing::info!(model = %model, "Ollama generator: model confirmed");
        Ok(generator)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn list_models(&self) -> Result<Vec<String>, RagError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagError::OllamaConnection(format!(
                "{} returned {}",
                url,
                status.as_u16()
            )));
        }

        let parsed: TagsResponse = response
            .json()
            .await
            .map_err(|e| RagError::ResponseParsing(e.to_string()))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    fn connection_error(&self, e: reqwest::Error) -> RagError {
        if e.is_connect() {
            RagError::OllamaConnection(self.base_url.clone())
        } else {
            RagError::OllamaConnection(e.to_string())
        }
    }
}

impl LlmGenerate for OllamaGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, RagError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            system: SYSTEM_PROMPT,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::OllamaConnection(format!(
                "status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RagError::ResponseParsing(e.to_string()))?;

        tracing::debug!(chars = parsed.response.len(), "Ollama completion received");
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    /// Minimal stand-in for the Ollama HTTP API on an ephemeral port.
    async fn fake_ollama() -> String {
        let app = Router::new()
            .route(
                "/api/tags",
                get(|| async { Json(json!({"models": [{"name": "medgemma:4b"}]})) }),
            )
            .route(
                "/api/generate",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["stream"], json!(false));
                    assert_eq!(body["system"], json!(SYSTEM_PROMPT));
                    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
                    Json(json!({"response": format!("echo: {prompt}")}))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[test]
    fn trims_trailing_slash() {
        let generator = OllamaGenerator::new("http://localhost:11434/", "medgemma").unwrap();
        assert_eq!(generator.base_url, "http://localhost:11434");
        assert_eq!(generator.model(), "medgemma");
    }

    #[tokio::test]
    async fn connect_confirms_installed_model() {
        let url = fake_ollama().await;
        let generator = OllamaGenerator::connect(&url, "medgemma").await.unwrap();
        assert_eq!(generator.complete("hello").await.unwrap(), "echo: hello");
    }

    #[tokio::test]
    async fn connect_rejects_missing_model() {
        let url = fake_ollama().await;
        let err = OllamaGenerator::connect(&url, "llama3").await.err().unwrap();
        assert!(matches!(err, RagError::NoModel(m) if m == "llama3"));
    }

    #[tokio::test]
    async fn unreachable_server_is_connection_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let generator = OllamaGenerator::new(&format!("http://{addr}"), "medgemma").unwrap();
        let err = generator.complete("hello").await.unwrap_err();
        assert!(matches!(err, RagError::OllamaConnection(_)));
    }
}
