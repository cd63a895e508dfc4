//! Client-facing surface: submit requests and poll their state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use vectorize_queue::RequestSourceService;
use vectorize_state::StateStore;
use vectorize_types::{VectorizationError, VectorizationRequest, VectorizationState};

use crate::error::WorkerError;

/// Accepts vectorization requests and exposes their processing state.
///
/// Submission validates the request, records a `Pending` state, and enqueues
/// the request on the source of its first remaining step. Synchronous callers
/// use [`VectorizationService::wait_for_completion`] to block on a terminal
/// status.
pub struct VectorizationService {
    sources: HashMap<String, Arc<dyn RequestSourceService>>,
    state_service: Arc<dyn StateStore>,
}

impl VectorizationService {
    /// Create a service over the worker's request sources and state store.
    pub fn new(
        sources: HashMap<String, Arc<dyn RequestSourceService>>,
        state_service: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            sources,
            state_service,
        }
    }

    /// Validate and enqueue a request for processing.
    ///
    /// # Errors
    ///
    /// Returns an error when the request's step lists are inconsistent, when
    /// it has no remaining steps, or when its first step has no configured
    /// source.
    pub async fn submit_request(
        &self,
        request: &VectorizationRequest,
    ) -> Result<(), WorkerError> {
        request.validate()?;
        let first_step = request
            .current_step()
            .ok_or_else(|| VectorizationError::NoRemainingSteps(request.id.clone()))?;

        let source = self
            .sources
            .get(first_step)
            .ok_or_else(|| WorkerError::UnknownRequestSource(first_step.to_string()))?;

        let state = VectorizationState::from_request(request);
        self.state_service.upsert_state(&state).await?;
        source.submit_request(request).await?;

        info!(
            request_id = %request.id,
            first_step = %first_step,
            steps = request.steps.len(),
            "Vectorization request accepted"
        );
        Ok(())
    }

    /// The current processing state of a request.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` (wrapped) when the request id is
    /// unknown.
    pub async fn get_request_state(
        &self,
        request_id: &str,
    ) -> Result<VectorizationState, WorkerError> {
        Ok(self.state_service.read_state(request_id).await?)
    }

    /// Poll until the request reaches a terminal status or the timeout
    /// elapses.
    ///
    /// Returns the final state; `None` when the timeout elapsed first.
    pub async fn wait_for_completion(
        &self,
        request_id: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Option<VectorizationState>, WorkerError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.state_service.has_state(request_id).await? {
                let state = self.state_service.read_state(request_id).await?;
                if state.status.is_terminal() {
                    return Ok(Some(state));
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vectorize_queue::MemoryRequestSourceService;
    use vectorize_state::InMemoryStateService;
    use vectorize_types::{
        ContentIdentifier, ProcessingType, RequestSourceSettings, VectorizationStatus,
        VectorizationStep,
    };

    fn sources_for(names: &[&str]) -> HashMap<String, Arc<dyn RequestSourceService>> {
        names
            .iter()
            .map(|name| {
                let settings = RequestSourceSettings {
                    name: name.to_string(),
                    connection_url: None,
                    visibility_timeout_secs: 30,
                };
                let source: Arc<dyn RequestSourceService> =
                    Arc::new(MemoryRequestSourceService::new(&settings));
                (name.to_string(), source)
            })
            .collect()
    }

    fn request(steps: &[&str]) -> VectorizationRequest {
        VectorizationRequest::new(
            "object-1",
            ContentIdentifier::new("docs/report.pdf", "datasource-1"),
            ProcessingType::Asynchronous,
            steps.iter().map(|s| VectorizationStep::new(*s)).collect(),
        )
    }

    #[tokio::test]
    async fn test_submit_enqueues_on_first_step_source() {
        let sources = sources_for(&["extract", "embed"]);
        let state_service = Arc::new(InMemoryStateService::new());
        let service = VectorizationService::new(sources.clone(), state_service.clone());

        let request = request(&["extract", "embed"]);
        service.submit_request(&request).await.unwrap();

        assert!(sources["extract"].has_requests().await.unwrap());
        assert!(!sources["embed"].has_requests().await.unwrap());

        let state = service.get_request_state(&request.id).await.unwrap();
        assert_eq!(state.status, VectorizationStatus::Pending);
    }

    #[tokio::test]
    async fn test_submit_rejects_unknown_first_step() {
        let sources = sources_for(&["extract"]);
        let service =
            VectorizationService::new(sources, Arc::new(InMemoryStateService::new()));

        let request = request(&["translate"]);
        let result = service.submit_request(&request).await;
        assert!(matches!(result, Err(WorkerError::UnknownRequestSource(_))));
    }

    #[tokio::test]
    async fn test_submit_rejects_request_without_steps() {
        let sources = sources_for(&["extract"]);
        let service =
            VectorizationService::new(sources, Arc::new(InMemoryStateService::new()));

        let request = request(&[]);
        assert!(service.submit_request(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_request_state() {
        let service = VectorizationService::new(
            sources_for(&["extract"]),
            Arc::new(InMemoryStateService::new()),
        );
        assert!(service.get_request_state("01ARZ3NDEKTSV4RRFFQ69G5FAV").await.is_err());
    }

    #[tokio::test]
    async fn test_wait_for_completion_times_out_on_pending() {
        let sources = sources_for(&["extract"]);
        let state_service = Arc::new(InMemoryStateService::new());
        let service = VectorizationService::new(sources, state_service);

        let request = request(&["extract"]);
        service.submit_request(&request).await.unwrap();

        let result = service
            .wait_for_completion(
                &request.id,
                Duration::from_millis(10),
                Duration::from_millis(50),
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_completion_returns_terminal_state() {
        let sources = sources_for(&["extract"]);
        let state_service = Arc::new(InMemoryStateService::new());
        let service = VectorizationService::new(sources, state_service.clone());

        let request = request(&["extract"]);
        service.submit_request(&request).await.unwrap();

        let mut state = state_service.read_state(&request.id).await.unwrap();
        state.status = VectorizationStatus::Completed;
        state_service.upsert_state(&state).await.unwrap();

        let result = service
            .wait_for_completion(
                &request.id,
                Duration::from_millis(10),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(result.unwrap().status, VectorizationStatus::Completed);
    }
}
