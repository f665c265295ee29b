//! Error types for the indexing and chat pipelines

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for doc-rag operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the pipelines and their adapters
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding or completion provider call failed
    #[error("Provider error during {operation}: {message}")]
    Provider { operation: String, message: String },

    /// Document store operation failed
    #[error("Store error during {operation}: {message}")]
    Store { operation: String, message: String },

    /// Object storage read failed
    #[error("Object storage error for '{path}': {message}")]
    Storage { path: String, message: String },

    /// File cannot be indexed; ingestion logs this and moves on
    #[error("Unsupported content '{file_name}': {reason}")]
    UnsupportedContent { file_name: String, reason: String },

    /// Record failed schema validation at the boundary
    #[error("Invalid document record: {0}")]
    InvalidRecord(String),

    /// Malformed object-storage notification
    #[error("Invalid storage event: {0}")]
    InvalidEvent(String),

    /// Malformed request on the HTTP surface
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// One or more records in a change batch could not be vectorized
    #[error("Vectorization failed for {failed}/{total} records: {first_error}")]
    VectorizationFailed {
        failed: usize,
        total: usize,
        first_error: String,
    },

    /// Chat turn was cancelled by a conversation clear or a dropped sink
    #[error("Chat turn cancelled")]
    TurnCancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a provider error
    pub fn provider(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a store error
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an object storage error
    pub fn storage(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported content error
    pub fn unsupported(file_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedContent {
            file_name: file_name.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether redelivering the same input could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Provider { .. }
                | Error::Store { .. }
                | Error::Storage { .. }
                | Error::VectorizationFailed { .. }
                | Error::Io(_)
                | Error::Http(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::store("sqlite", err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::Provider { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
            Error::Store { .. } => (StatusCode::SERVICE_UNAVAILABLE, "store_error"),
            Error::Storage { .. } => (StatusCode::SERVICE_UNAVAILABLE, "storage_error"),
            Error::UnsupportedContent { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unsupported_content")
            }
            Error::InvalidRecord(_) => (StatusCode::BAD_REQUEST, "invalid_record"),
            Error::InvalidEvent(_) => (StatusCode::BAD_REQUEST, "invalid_event"),
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Error::VectorizationFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "vectorization_failed")
            }
            Error::TurnCancelled => (StatusCode::CONFLICT, "turn_cancelled"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "http_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
