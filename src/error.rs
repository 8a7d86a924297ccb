//! Error types for the state store.

use thiserror::Error;

/// Main error type for store operations.
///
/// Structural errors (invalid paths, malformed updates) are surfaced
/// synchronously to the caller. Runtime errors from subscribers or
/// persistence adapters are isolated and reported, never raised through
/// the update pipeline.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Store already registered: {0}")]
    StoreExists(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
