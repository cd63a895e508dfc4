//! # vectorize-queue
//!
//! Named queue abstraction binding one pipeline stage to one request source,
//! with lease (visibility-timeout) semantics.
//!
//! A received request becomes invisible to other consumers for the source's
//! visibility timeout. It must be deleted (completed) before the timeout
//! expires; otherwise it becomes visible again and is redelivered, which is
//! the retry mechanism. Delivery is therefore at-least-once; step handlers
//! are required to be idempotent.
//!
//! Two interchangeable backends:
//! - [`MemoryRequestSourceService`] — in-process, for tests and single-node use
//! - [`RedisRequestSourceService`] — crash-survivable storage with true
//!   distributed visibility timeouts

pub mod builder;
pub mod error;
pub mod memory;
pub mod redis_source;

use async_trait::async_trait;
use vectorize_types::VectorizationRequest;

pub use builder::RequestSourcesBuilder;
pub use error::QueueError;
pub use memory::MemoryRequestSourceService;
pub use redis_source::RedisRequestSourceService;

/// A request received from a source together with its lease handle.
///
/// The `(message_id, receipt)` pair is required to delete or update the
/// underlying message; a stale receipt (the lease expired and the message was
/// re-received elsewhere) is rejected by the backend.
#[derive(Debug, Clone)]
pub struct LeasedRequest {
    /// The vectorization request payload
    pub request: VectorizationRequest,

    /// Backend identifier of the underlying message
    pub message_id: String,

    /// Proof of the current lease; rotated on every receive
    pub receipt: String,

    /// How many times the message has been received
    pub dequeue_count: u64,
}

/// A named request source bound to one pipeline stage.
#[async_trait]
pub trait RequestSourceService: Send + Sync {
    /// The name of the source (matches the step name it serves).
    fn source_name(&self) -> &str;

    /// Whether the source has requests available to receive.
    async fn has_requests(&self) -> Result<bool, QueueError>;

    /// Enqueue a request. Never blocks on downstream capacity; backend
    /// unavailability propagates as an error.
    async fn submit_request(&self, request: &VectorizationRequest) -> Result<(), QueueError>;

    /// Receive up to `max` requests not currently leased elsewhere.
    ///
    /// Each returned request is invisible to further receives for the
    /// source's visibility timeout.
    async fn receive_requests(&self, max: usize) -> Result<Vec<LeasedRequest>, QueueError>;

    /// Permanently remove a request from the source. Call only after the
    /// step's side effects are durably committed.
    async fn delete_request(&self, message_id: &str, receipt: &str) -> Result<(), QueueError>;

    /// Persist a mutated request payload (error count) without completing
    /// the message; it becomes visible again after the lease expires.
    async fn update_request(
        &self,
        message_id: &str,
        receipt: &str,
        request: &VectorizationRequest,
    ) -> Result<(), QueueError>;
}
