use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::documents::DocumentError;
use crate::generation::error::ImageError;
use crate::llm_client::LlmError;
use crate::messaging::PublishError;
use crate::secrets::SecretError;

/// Invocation-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
/// Item-level failures never reach this type; they end up in a batch summary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Config fetch failed: {0}")]
    ConfigFetch(#[from] SecretError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Document store error: {0}")]
    Documents(#[from] DocumentError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// The model answered, but not with the JSON object asked for.
    #[error("Unusable model output: {0}")]
    UnusableOutput(String),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::ConfigFetch(e) => {
                tracing::error!("Config fetch error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_FETCH_ERROR",
                    "A required configuration value could not be loaded".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Documents(e) => {
                tracing::error!("Document store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Llm(e) => {
                tracing::error!("LLM error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::UnusableOutput(msg) => {
                tracing::error!("Unusable model output: {msg}");
                (StatusCode::BAD_GATEWAY, "INVALID_MODEL_OUTPUT", msg.clone())
            }
            AppError::Image(e) => {
                tracing::error!("Image error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "IMAGE_ERROR",
                    "The image could not be generated".to_string(),
                )
            }
            AppError::Publish(e) => {
                tracing::error!("Publish error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PUBLISH_ERROR",
                    "Messages could not be published".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
