//! Worker crate error types.

use thiserror::Error;
use vectorize_queue::QueueError;
use vectorize_state::StateError;
use vectorize_types::VectorizationError;

/// Errors that can occur while building or running a vectorization worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Invalid worker configuration, caught at build time
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A manager or request references a source that is not configured
    #[error("Unknown request source [{0}]")]
    UnknownRequestSource(String),

    /// No handler is registered for the step name
    #[error("Unsupported step [{0}]")]
    UnsupportedStep(String),

    /// Queue layer failure
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// State store failure
    #[error(transparent)]
    State(#[from] StateError),

    /// Domain-level request failure
    #[error(transparent)]
    Request(#[from] VectorizationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkerError::UnknownRequestSource("embed".to_string());
        assert!(err.to_string().contains("[embed]"));

        let err = WorkerError::UnsupportedStep("translate".to_string());
        assert!(err.to_string().contains("Unsupported step"));
    }
}
