use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::ProviderError;
use crate::tailoring::mode::TailoringMode;
use crate::tailoring::orchestrator::TailoringError;
use crate::tailoring::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// User-visible messages come from a closed set; provider and database
/// details are logged, never returned.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid tailoring mode: {0}")]
    InvalidMode(String),

    #[error("Quota exceeded for {mode}: limit {limit}")]
    QuotaExceeded { mode: TailoringMode, limit: u32 },

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<TailoringError> for AppError {
    fn from(err: TailoringError) -> Self {
        match err {
            TailoringError::InvalidMode(mode) => AppError::InvalidMode(mode),
            TailoringError::Validation(msg) => AppError::Validation(msg),
            e @ TailoringError::JobInFlight { .. } => AppError::Conflict(e.to_string()),
            TailoringError::QuotaExceeded { mode, limit } => {
                AppError::QuotaExceeded { mode, limit }
            }
            e @ TailoringError::ProviderUnavailable { .. } => {
                AppError::ProviderUnavailable(e.to_string())
            }
            TailoringError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotConfigured(name) => {
                AppError::NotFound(format!("Provider '{name}' is not configured"))
            }
            other => AppError::ProviderUnavailable(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::InvalidMode(mode) => (
                StatusCode::BAD_REQUEST,
                "INVALID_MODE",
                format!(
                    "'{mode}' is not a tailoring mode. Choose basic, personalized, aggressive, \
                    coverLetter, linkedin or interview."
                ),
            ),
            AppError::QuotaExceeded { mode, limit } => (
                StatusCode::TOO_MANY_REQUESTS,
                "QUOTA_EXCEEDED",
                format!(
                    "You have used all {limit} {mode} tailorings for today. \
                    Upgrade to premium or try again tomorrow."
                ),
            ),
            AppError::ProviderUnavailable(detail) => {
                tracing::error!("Provider unavailable: {detail}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "PROVIDER_UNAVAILABLE",
                    "The AI service is temporarily unavailable. Please try again shortly."
                        .to_string(),
                )
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "JOB_IN_FLIGHT", msg.clone()),
            AppError::Store(e) => {
                tracing::error!("Store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
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
