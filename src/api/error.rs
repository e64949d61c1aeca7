//! API error types with structured JSON responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::orchestrator::PipelineError;
use crate::pipeline::patterns::PatternError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Request cancelled")]
    Cancelled,
    #[error("No pattern file configured")]
    NoPatternSource,
    #[error("Pattern reload failed: {0}")]
    InvalidPatterns(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone()),
            ApiError::Cancelled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CANCELLED",
                "Request cancelled, server shutting down".to_string(),
            ),
            ApiError::NoPatternSource => (
                StatusCode::CONFLICT,
                "NO_PATTERN_SOURCE",
                "Patterns are built in; no file to reload".to_string(),
            ),
            ApiError::InvalidPatterns(detail) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_PATTERNS",
                detail.clone(),
            ),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Cancelled => ApiError::Cancelled,
        }
    }
}

impl From<PatternError> for ApiError {
    fn from(err: PatternError) -> Self {
        match err {
            PatternError::NoSource => ApiError::NoPatternSource,
            PatternError::Io(e) => ApiError::Internal(e.to_string()),
            other => ApiError::InvalidPatterns(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn bad_request_returns_400() {
        let response = ApiError::BadRequest("query must not be empty".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        assert_eq!(json["error"]["message"], "query must not be empty");
    }

    #[tokio::test]
    async fn internal_error_hides_detail() {
        let response = ApiError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn pattern_errors_map_to_statuses() {
        let response = ApiError::from(PatternError::NoSource).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let invalid = PatternError::InvalidValue {
            field: "emergency_confidence".into(),
            value: "2".into(),
        };
        let response = ApiError::from(invalid).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "INVALID_PATTERNS");
    }

    #[tokio::test]
    async fn cancelled_returns_503() {
        let response = ApiError::from(PipelineError::Cancelled).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
