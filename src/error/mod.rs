//! Error types for session management.

use thiserror::Error;

/// Errors raised by a [`crate::storage::KeyValueStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Primary error type for session and refresh operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("A refresh is already in flight")]
    RefreshInFlight,

    #[error("Session changed while the refresh was in flight")]
    SessionChanged,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed refresh payload: {0}")]
    MalformedPayload(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Payload,
    Storage,
    Configuration,
}

impl SessionError {
    /// Create an API error from a status code and response body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotLoggedIn
            | Self::NoRefreshToken
            | Self::RefreshInFlight
            | Self::SessionChanged => ErrorCategory::Authentication,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::MalformedPayload(_) | Self::Serialization(_) => ErrorCategory::Payload,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SessionError>;
