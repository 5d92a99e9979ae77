use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid configuration: {}", describe_fields(.0))]
    InvalidConfig(Vec<FieldError>),

    /// The external capability returned structure the engine cannot use.
    #[error("Parsing failure: {0}")]
    Parsing(String),

    /// Intermediate data that must never reach the scorer did.
    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM credentials were rejected: {0}")]
    LlmUnauthorized(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] redis::RedisError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Maps a capability failure into the service taxonomy.
    /// Auth failures are always fatal; unusable output is a parsing failure.
    pub fn from_llm(context: &str, err: LlmError) -> Self {
        if err.is_auth() {
            AppError::LlmUnauthorized(format!("{context}: {err}"))
        } else if err.is_malformed() {
            AppError::Parsing(format!("{context}: {err}"))
        } else {
            AppError::Llm(format!("{context}: {err}"))
        }
    }

    /// Stable machine-readable code, shared by HTTP bodies and queue results.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidConfig(_) => "INVALID_CONFIG",
            AppError::Parsing(_) => "PARSING_FAILURE",
            AppError::Scoring(_) => "SCORING_ERROR",
            AppError::Llm(_) => "LLM_ERROR",
            AppError::LlmUnauthorized(_) => "LLM_UNAUTHORIZED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Queue(_) => "QUEUE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Errors that must abort a run immediately rather than degrade a round.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::InvalidConfig(_) | AppError::Scoring(_) | AppError::LlmUnauthorized(_)
        )
    }
}

fn describe_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut fields: Vec<FieldError> = Vec::new();
        let code = self.code();
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidConfig(errors) => {
                fields = errors.clone();
                (StatusCode::BAD_REQUEST, "Optimization config is invalid".to_string())
            }
            AppError::Parsing(msg) => {
                tracing::warn!("Parsing failure: {msg}");
                (StatusCode::UNPROCESSABLE_ENTITY, msg.clone())
            }
            AppError::Scoring(msg) => {
                tracing::error!("Scoring error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Scoring failed on malformed intermediate data".to_string(),
                )
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::LlmUnauthorized(msg) => {
                tracing::error!("LLM unauthorized: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "The AI provider rejected the configured credentials".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            AppError::Queue(e) => {
                tracing::error!("Queue error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A job queue error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if !fields.is_empty() {
            error["fields"] = json!(fields);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
