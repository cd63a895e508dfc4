//! Queue layer error types.

use thiserror::Error;

/// Errors that can occur in the request source layer.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue backend is unreachable or rejected the operation
    #[error("Queue backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// The message id is unknown or the receipt does not match the
    /// current lease
    #[error("Unknown message or stale receipt: {0}")]
    UnknownReceipt(String),

    /// Request payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid source configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueueError::UnknownReceipt("msg-1".to_string());
        assert!(err.to_string().contains("msg-1"));

        let err = QueueError::Configuration("duplicate source name [extract]".to_string());
        assert!(err.to_string().contains("duplicate source name"));
    }
}
