//! State store error types.

use thiserror::Error;

/// Errors that can occur in the state persistence layer.
#[derive(Debug, Error)]
pub enum StateError {
    /// No state record for the request id
    #[error("State not found for request {0}")]
    NotFound(String),

    /// Filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid request id (would escape the state directory)
    #[error("Invalid request id: {0}")]
    InvalidRequestId(String),
}
