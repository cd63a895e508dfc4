//! In-memory state store for tests and single-node deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use vectorize_types::VectorizationState;

use crate::error::StateError;
use crate::StateStore;

/// State store backed by a process-local map. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryStateService {
    states: RwLock<HashMap<String, VectorizationState>>,
}

impl InMemoryStateService {
    /// Create an empty in-memory state store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of state records currently held.
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateService {
    async fn has_state(&self, request_id: &str) -> Result<bool, StateError> {
        Ok(self.states.read().await.contains_key(request_id))
    }

    async fn read_state(&self, request_id: &str) -> Result<VectorizationState, StateError> {
        self.states
            .read()
            .await
            .get(request_id)
            .cloned()
            .ok_or_else(|| StateError::NotFound(request_id.to_string()))
    }

    async fn upsert_state(&self, state: &VectorizationState) -> Result<(), StateError> {
        self.states
            .write()
            .await
            .insert(state.request_id.clone(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vectorize_types::{
        ContentIdentifier, ProcessingType, VectorizationRequest, VectorizationStep,
        VectorizationStatus,
    };

    fn sample_state() -> VectorizationState {
        let request = VectorizationRequest::new(
            "object-1",
            ContentIdentifier::new("docs/report.pdf", "datasource-1"),
            ProcessingType::Asynchronous,
            vec![VectorizationStep::new("extract")],
        );
        VectorizationState::from_request(&request)
    }

    #[tokio::test]
    async fn test_upsert_and_read() {
        let store = InMemoryStateService::new();
        let state = sample_state();

        assert!(!store.has_state(&state.request_id).await.unwrap());
        store.upsert_state(&state).await.unwrap();
        assert!(store.has_state(&state.request_id).await.unwrap());

        let read = store.read_state(&state.request_id).await.unwrap();
        assert_eq!(read.request_id, state.request_id);
        assert_eq!(read.status, VectorizationStatus::Pending);
    }

    #[tokio::test]
    async fn test_read_missing_state() {
        let store = InMemoryStateService::new();
        let result = store.read_state("missing").await;
        assert!(matches!(result, Err(StateError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing() {
        let store = InMemoryStateService::new();
        let mut state = sample_state();

        store.upsert_state(&state).await.unwrap();
        state.mark_failed("boom");
        store.upsert_state(&state).await.unwrap();

        let read = store.read_state(&state.request_id).await.unwrap();
        assert_eq!(read.status, VectorizationStatus::Failed);
        assert_eq!(read.last_error.as_deref(), Some("boom"));
        assert_eq!(store.len().await, 1);
    }
}
