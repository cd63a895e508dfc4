//! # vectorize-state
//!
//! Durable key-value persistence for vectorization request state.
//!
//! One record exists per request id. Request managers upsert the record after
//! every step transition; last-writer-wins per id is acceptable because a
//! given request is only actively advanced by one manager at a time.
//!
//! Two implementations are provided:
//! - [`InMemoryStateService`] for tests and single-node deployments
//! - [`FileStateService`] persisting one JSON document per request id

pub mod error;
pub mod file;
pub mod memory;

use async_trait::async_trait;
use vectorize_types::VectorizationState;

pub use error::StateError;
pub use file::FileStateService;
pub use memory::InMemoryStateService;

/// Durable persistence for vectorization request state, keyed by request id.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Whether a state record exists for the request id.
    async fn has_state(&self, request_id: &str) -> Result<bool, StateError>;

    /// Read the state record for the request id.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if no record exists.
    async fn read_state(&self, request_id: &str) -> Result<VectorizationState, StateError>;

    /// Write or replace the state record for the request id.
    async fn upsert_state(&self, state: &VectorizationState) -> Result<(), StateError>;
}
