pub mod types;
pub mod classify;
pub mod knowledge;
pub mod retrieval;
pub mod prompt;
pub mod synthesis;
pub mod ollama;
pub mod vector_client;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Ollama connection failed: {0}")]
    OllamaConnection(String),

    #[error("Model not available: {0}")]
    NoModel(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Vector search failed: {0}")]
    VectorSearch(String),

    #[error("{service} timed out after {millis} ms")]
    Timeout { service: &'static str, millis: u128 },

    #[error("{0} is unavailable")]
    Unavailable(&'static str),

    #[error("Knowledge base error: {0}")]
    Knowledge(String),
}
