//! Step handler capability and dispatch registry.
//!
//! Handlers implement the actual pipeline stages (extraction, partitioning,
//! embedding, indexing); the engine only requires "given a request and a
//! step's parameters, return success or a failure with a retryability flag".
//! Delivery is at-least-once, so handlers must be safe to invoke more than
//! once for the same request and step.
//!
//! Dispatch is an explicit name-to-handler map built once at startup; an
//! unregistered step name is a clear error instead of a reflective lookup
//! failure.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use vectorize_types::{VectorizationRequest, VectorizationState};

use crate::error::WorkerError;

/// Failure reported by a step handler.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    /// Human-readable failure reason, persisted to state
    pub message: String,

    /// Whether the step should be retried after the lease expires
    pub retryable: bool,
}

impl HandlerFailure {
    /// A transient failure; the request will be redelivered.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A permanent failure; the request's pipeline ends.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A pipeline step implementation.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// The step name this handler serves.
    fn step_id(&self) -> &str;

    /// Execute the step for a request.
    ///
    /// `parameters` is the string-keyed map carried by the request's step
    /// definition. Artifacts and audit entries go into `state`; the engine
    /// persists it after the call.
    async fn execute(
        &self,
        request: &VectorizationRequest,
        state: &mut VectorizationState,
        parameters: &HashMap<String, String>,
    ) -> Result<(), HandlerFailure>;
}

/// Name-to-handler dispatch map, built once at startup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn StepHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its step name, replacing any previous
    /// registration for that name.
    pub fn register(&mut self, handler: Arc<dyn StepHandler>) {
        self.handlers
            .insert(handler.step_id().to_string(), handler);
    }

    /// Resolve the handler for a step name.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::UnsupportedStep` when no handler is registered
    /// for the name.
    pub fn resolve(&self, step: &str) -> Result<Arc<dyn StepHandler>, WorkerError> {
        self.handlers
            .get(step)
            .cloned()
            .ok_or_else(|| WorkerError::UnsupportedStep(step.to_string()))
    }

    /// Names of all registered steps.
    pub fn step_names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

/// Handler that logs and succeeds without side effects.
///
/// Used to smoke-test pipeline wiring before real handlers are plugged in.
pub struct NoopStepHandler {
    step: String,
}

impl NoopStepHandler {
    /// Create a noop handler for a step name.
    pub fn new(step: impl Into<String>) -> Self {
        Self { step: step.into() }
    }
}

#[async_trait]
impl StepHandler for NoopStepHandler {
    fn step_id(&self) -> &str {
        &self.step
    }

    async fn execute(
        &self,
        request: &VectorizationRequest,
        _state: &mut VectorizationState,
        _parameters: &HashMap<String, String>,
    ) -> Result<(), HandlerFailure> {
        info!(step = %self.step, request_id = %request.id, "Noop handler executed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vectorize_types::{ContentIdentifier, ProcessingType, VectorizationStep};

    fn sample_request() -> VectorizationRequest {
        VectorizationRequest::new(
            "object-1",
            ContentIdentifier::new("docs/report.pdf", "datasource-1"),
            ProcessingType::Asynchronous,
            vec![VectorizationStep::new("extract")],
        )
    }

    #[test]
    fn test_registry_resolves_registered_handler() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(NoopStepHandler::new("extract")));

        let handler = registry.resolve("extract").unwrap();
        assert_eq!(handler.step_id(), "extract");
    }

    #[test]
    fn test_registry_unsupported_step() {
        let registry = HandlerRegistry::new();
        let result = registry.resolve("translate");
        assert!(matches!(result, Err(WorkerError::UnsupportedStep(_))));
    }

    #[test]
    fn test_registry_replaces_handler_for_same_step() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(NoopStepHandler::new("extract")));
        registry.register(Arc::new(NoopStepHandler::new("extract")));
        assert_eq!(registry.step_names().len(), 1);
    }

    #[tokio::test]
    async fn test_noop_handler_succeeds() {
        let handler = NoopStepHandler::new("extract");
        let request = sample_request();
        let mut state = VectorizationState::from_request(&request);

        let result = handler
            .execute(&request, &mut state, &HashMap::new())
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_failure_constructors() {
        let failure = HandlerFailure::retryable("throttled");
        assert!(failure.retryable);

        let failure = HandlerFailure::fatal("malformed content");
        assert!(!failure.retryable);
        assert_eq!(failure.to_string(), "malformed content");
    }
}
