//! # vectorize-worker
//!
//! Job distribution and execution engine for the vectorize pipeline.
//!
//! A [`VectorizationWorker`] owns one [`RequestManagerService`] per pipeline
//! stage. Each manager continuously leases requests from its bound request
//! source, claims a slot from its [`TaskPool`], executes the step handler for
//! the request's first remaining step, and re-routes the request: to the next
//! step's source on success, back to the same source (via lease expiry) on a
//! retryable failure, or to a terminal `Failed` state otherwise.
//!
//! Construction goes through [`VectorizationWorkerBuilder`], which validates
//! the configuration and wires request sources, the state store, and the
//! managers together. Submission and status polling go through
//! [`VectorizationService`].

pub mod builder;
pub mod error;
pub mod handler;
pub mod manager;
pub mod service;
pub mod task_pool;
pub mod worker;

pub use builder::VectorizationWorkerBuilder;
pub use error::WorkerError;
pub use handler::{HandlerFailure, HandlerRegistry, NoopStepHandler, StepHandler};
pub use manager::RequestManagerService;
pub use service::VectorizationService;
pub use task_pool::TaskPool;
pub use worker::VectorizationWorker;
