//! File-backed state store.
//!
//! Persists one JSON document per request id under a root directory. Writes
//! go through a temp file followed by a rename so a crash mid-write never
//! leaves a truncated record behind.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use vectorize_types::VectorizationState;

use crate::error::StateError;
use crate::StateStore;

/// State store persisting each record as `<root>/<request_id>.json`.
pub struct FileStateService {
    root: PathBuf,
}

impl FileStateService {
    /// Open a file state store rooted at `root`, creating the directory if
    /// necessary.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StateError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "Opened file state store");
        Ok(Self { root })
    }

    fn record_path(&self, request_id: &str) -> Result<PathBuf, StateError> {
        // Request ids are ULIDs generated by us, but ids arrive over the
        // queue; reject anything that could leave the state directory.
        if request_id.is_empty()
            || request_id
                .chars()
                .any(|c| !c.is_ascii_alphanumeric() && c != '-' && c != '_')
        {
            return Err(StateError::InvalidRequestId(request_id.to_string()));
        }
        Ok(self.root.join(format!("{request_id}.json")))
    }
}

#[async_trait]
impl StateStore for FileStateService {
    async fn has_state(&self, request_id: &str) -> Result<bool, StateError> {
        let path = self.record_path(request_id)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn read_state(&self, request_id: &str) -> Result<VectorizationState, StateError> {
        let path = self.record_path(request_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound(request_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn upsert_state(&self, state: &VectorizationState) -> Result<(), StateError> {
        let path = self.record_path(&state.request_id)?;
        // Unique temp name per write: concurrent upserts of the same id must
        // not interleave in a shared temp file before the rename.
        let tmp_path = path.with_extension(format!("json.{}.tmp", ulid::Ulid::new()));

        let bytes = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(request_id = %state.request_id, "Persisted state record");
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
    async fn test_upsert_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateService::open(dir.path()).await.unwrap();
        let state = sample_state();

        store.upsert_state(&state).await.unwrap();
        assert!(store.has_state(&state.request_id).await.unwrap());

        let read = store.read_state(&state.request_id).await.unwrap();
        assert_eq!(read.request_id, state.request_id);
        assert_eq!(read.status, VectorizationStatus::Pending);
    }

    #[tokio::test]
    async fn test_read_missing_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateService::open(dir.path()).await.unwrap();

        let result = store.read_state("01HN4QXKN6YWXVKZ3JMHP4BCDE").await;
        assert!(matches!(result, Err(StateError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateService::open(dir.path()).await.unwrap();
        let mut state = sample_state();

        store.upsert_state(&state).await.unwrap();
        state.mark_failed("downstream throttled");
        store.upsert_state(&state).await.unwrap();

        let read = store.read_state(&state.request_id).await.unwrap();
        assert_eq!(read.status, VectorizationStatus::Failed);
    }

    #[tokio::test]
    async fn test_rejects_path_escaping_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateService::open(dir.path()).await.unwrap();

        let result = store.read_state("../outside").await;
        assert!(matches!(result, Err(StateError::InvalidRequestId(_))));
    }

    #[tokio::test]
    async fn test_concurrent_upserts_of_same_id_leave_a_valid_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FileStateService::open(dir.path()).await.unwrap());
        let state = sample_state();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = std::sync::Arc::clone(&store);
            let mut state = state.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..20 {
                    state.log_step(format!("msg-{i}"), "extract", "Started handling step.");
                    store.upsert_state(&state).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // Whichever writer won, the record parses and belongs to the id.
        let read = store.read_state(&state.request_id).await.unwrap();
        assert_eq!(read.request_id, state.request_id);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let state = sample_state();

        {
            let store = FileStateService::open(dir.path()).await.unwrap();
            store.upsert_state(&state).await.unwrap();
        }

        let store = FileStateService::open(dir.path()).await.unwrap();
        let read = store.read_state(&state.request_id).await.unwrap();
        assert_eq!(read.request_id, state.request_id);
    }
}
