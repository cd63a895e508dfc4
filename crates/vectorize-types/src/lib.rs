//! # vectorize-types
//!
//! Shared domain types for the vectorize pipeline.
//!
//! This crate defines the core data structures used throughout the system:
//! - Requests: vectorization jobs moving through ordered pipeline steps
//! - States: durable per-job progress records
//! - Settings: worker, request manager, and request source configuration
//!
//! ## Usage
//!
//! ```rust
//! use vectorize_types::{VectorizationRequest, VectorizationStep};
//!
//! let request = VectorizationRequest::new(
//!     "content-object-id",
//!     vectorize_types::ContentIdentifier::new("docs/handbook.pdf", "data-source-01"),
//!     vectorize_types::ProcessingType::Asynchronous,
//!     vec![
//!         VectorizationStep::new("extract"),
//!         VectorizationStep::new("embed"),
//!     ],
//! );
//! assert_eq!(request.current_step(), Some("extract"));
//! ```

pub mod config;
pub mod error;
pub mod request;
pub mod state;

pub use config::{
    QueuingEngine, RequestManagerSettings, RequestSourceSettings, Settings, WorkerSettings,
};
pub use error::VectorizationError;
pub use request::{
    ContentIdentifier, ProcessingType, VectorizationRequest, VectorizationStep,
};
pub use state::{
    VectorizationArtifact, VectorizationLogEntry, VectorizationState, VectorizationStatus,
};
