//! Error types for ReportQA services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for ingestion, retrieval and provider failures
//! - HTTP status code mapping
//! - Structured error responses with user-safe messages
//! - Error codes for client handling

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Message returned to callers whenever a provider or internal failure
/// aborts a query. Raw provider text never leaves the process.
pub const RETRY_MESSAGE: &str =
    "The answer service is temporarily unavailable. Please try again.";

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidArgument,

    // Resource errors (4xxx)
    UnknownCollection,

    // Conflict errors (5xxx)
    DuplicateCollection,

    // Ingestion errors (7xxx)
    IngestionError,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    ProviderTimeout,
    LanguageModelError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidArgument => 1002,

            ErrorCode::UnknownCollection => 4001,

            ErrorCode::DuplicateCollection => 5001,

            ErrorCode::IngestionError => 7001,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::ProviderTimeout => 8003,
            ErrorCode::LanguageModelError => 8004,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    // Registry errors
    #[error("Unknown collection: {name}")]
    UnknownCollection { name: String },

    #[error("Collection already registered: {name}")]
    DuplicateCollection { name: String },

    // Ingestion errors
    #[error("Ingestion failed for {path}: {message}")]
    Ingestion { path: String, message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Provider timeout during {stage} after {timeout_ms}ms")]
    ProviderTimeout { stage: String, timeout_ms: u64 },

    #[error("Language model error: {message}")]
    LanguageModel { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for an `InvalidArgument` error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        AppError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            AppError::UnknownCollection { .. } => ErrorCode::UnknownCollection,
            AppError::DuplicateCollection { .. } => ErrorCode::DuplicateCollection,
            AppError::Ingestion { .. } => ErrorCode::IngestionError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::ProviderTimeout { .. } => ErrorCode::ProviderTimeout,
            AppError::LanguageModel { .. } => ErrorCode::LanguageModelError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::InvalidArgument { .. } => {
                StatusCode::BAD_REQUEST
            }

            // 404 Not Found
            AppError::UnknownCollection { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::DuplicateCollection { .. } => StatusCode::CONFLICT,

            // 500 Internal Server Error
            AppError::Ingestion { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::EmbeddingError { .. }
            | AppError::LanguageModel { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            AppError::ProviderTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Message that is safe to show to an end user.
    ///
    /// Client errors describe the caller's own input and are returned as-is;
    /// everything else collapses to a generic retry message.
    pub fn user_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            RETRY_MESSAGE.to_string()
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let detail = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %detail,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %detail,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message: self.user_message(),
                request_id: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

/// Malformed or mistyped request bodies get the same envelope as every other error
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation {
            message: rejection.body_text(),
            field: Some("body".to_string()),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
