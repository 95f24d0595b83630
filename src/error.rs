//! Error types for bucketfs.

use thiserror::Error;

/// Main error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The URI could not be split into scheme, bucket and path.
    #[error("Invalid URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// No store is registered for the URI scheme.
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// An argument was out of range or malformed (e.g. a bad seek whence).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not allowed in the current stream state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A local path or remote object that must exist does not.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote store rejected or failed a request.
    #[error("{store} error: {message}")]
    Backend { store: String, message: String },

    /// A batch request failed for some of its items. Items that succeeded stay applied.
    #[error("Batch {op} failed for {failed}/{total} objects, first error: {first}")]
    Batch {
        op: &'static str,
        failed: usize,
        total: usize,
        first: String,
    },

    /// Custom error message.
    #[error("{0}")]
    Custom(String),
}

impl StorageError {
    pub fn backend(store: &str, message: impl std::fmt::Display) -> Self {
        StorageError::Backend {
            store: store.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invalid_uri(uri: &str, reason: &str) -> Self {
        StorageError::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Backend { .. } | StorageError::Io(_))
    }
}

impl From<StorageError> for std::io::Error {
    fn from(err: StorageError) -> Self {
        use std::io::ErrorKind;
        match err {
            StorageError::Io(e) => e,
            other @ StorageError::NotFound(_) => std::io::Error::new(ErrorKind::NotFound, other),
            other @ (StorageError::InvalidArgument(_) | StorageError::InvalidUri { .. }) => {
                std::io::Error::new(ErrorKind::InvalidInput, other)
            }
            other => std::io::Error::new(ErrorKind::Other, other),
        }
    }
}

/// Result type alias for bucketfs operations.
pub type Result<T> = std::result::Result<T, StorageError>;
