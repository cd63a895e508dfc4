//! Error types shared across the vectorize pipeline.

use thiserror::Error;

/// Unified error type for vectorization domain operations.
#[derive(Debug, Error)]
pub enum VectorizationError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid request content
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Attempted to advance a request that has no remaining steps
    #[error("No remaining steps for request {0}")]
    NoRemainingSteps(String),

    /// Attempted to roll back a request that has no completed steps
    #[error("No completed steps for request {0}")]
    NoCompletedSteps(String),

    /// Step not found in the request's step list
    #[error("Step [{step}] not found in request {request_id}")]
    UnknownStep { request_id: String, step: String },
}
