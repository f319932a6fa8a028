//! Error types for the microblog core.
//!
//! Index failures never appear here as returned errors from the sync path;
//! they are logged and swallowed by [`crate::search::IndexClient`]. What does
//! surface is split between validation failures (bad caller input) and
//! infrastructure failures (store, filesystem, serialization).

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the microblog core.
#[derive(Debug, Error)]
pub enum BlogError {
    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Search index errors (only ever raised by backends; the client swallows them)
    #[error("Search index error: {message}")]
    Index { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },
}

/// Result type alias for microblog operations.
pub type Result<T> = std::result::Result<T, BlogError>;

impl From<std::io::Error> for BlogError {
    fn from(err: std::io::Error) -> Self {
        BlogError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for BlogError {
    fn from(err: serde_json::Error) -> Self {
        BlogError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for BlogError {
    fn from(err: rusqlite::Error) -> Self {
        BlogError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl BlogError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        BlogError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BlogError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Error for a poisoned connection mutex.
    pub(crate) fn lock_poisoned() -> Self {
        BlogError::Database {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        }
    }

    /// True for failures caused by caller input rather than infrastructure.
    pub fn is_validation(&self) -> bool {
        matches!(self, BlogError::Validation { .. })
    }
}
