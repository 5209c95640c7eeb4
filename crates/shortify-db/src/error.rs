//! Row store error types.

use thiserror::Error;

/// Result type for row store operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur talking to the row store.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Row not found: {0}")]
    NotFound(String),

    #[error("Row already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Rate limited")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::AuthError(message),
            403 => Self::PermissionDenied(message),
            404 => Self::NotFound(message),
            409 => Self::AlreadyExists(message),
            412 => Self::PreconditionFailed(message),
            429 => Self::RateLimited { retry_after_ms: None },
            500..=599 => Self::ServerError { status, message },
            _ => Self::RequestFailed(message),
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::Network(_) | DbError::RateLimited { .. } | DbError::ServerError { .. }
        )
    }

    /// Server-requested backoff, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            DbError::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }

    /// HTTP status the error corresponds to, for metrics.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            DbError::AuthError(_) => Some(401),
            DbError::PermissionDenied(_) => Some(403),
            DbError::NotFound(_) => Some(404),
            DbError::AlreadyExists(_) => Some(409),
            DbError::PreconditionFailed(_) => Some(412),
            DbError::RateLimited { .. } => Some(429),
            DbError::ServerError { status, .. } => Some(*status),
            DbError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
