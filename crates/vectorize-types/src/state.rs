//! Persisted per-request state.
//!
//! One state record exists per request id. Request managers upsert the record
//! after every step transition; status polling and crash recovery read it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::{ContentIdentifier, VectorizationRequest};

/// Lifecycle status of a vectorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VectorizationStatus {
    /// Submitted, not yet picked up by a request manager
    #[default]
    Pending,
    /// At least one step has started executing
    InProgress,
    /// All steps completed successfully
    Completed,
    /// A step failed without retry, or retries were exhausted
    Failed,
}

impl VectorizationStatus {
    /// Whether the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VectorizationStatus::Completed | VectorizationStatus::Failed)
    }
}

/// A named artifact produced by a step (extracted text, partition manifest,
/// index entry ids). Free-form content, interpreted by downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizationArtifact {
    /// Artifact kind ("extracted_text", "partitions", "index_references", ...)
    pub kind: String,

    /// Position for multi-part artifacts; 0 for singletons
    #[serde(default)]
    pub position: u32,

    /// Artifact payload
    pub content: String,
}

/// One audit entry for an action executed by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizationLogEntry {
    /// Identifier of the request the entry belongs to
    pub request_id: String,

    /// Underlying queue message id, when the action came from a source
    pub message_id: String,

    /// Step the action belongs to
    pub step: String,

    /// Entry text
    pub text: String,

    /// When the entry was recorded
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
}

impl VectorizationLogEntry {
    /// Create a log entry stamped with the current time.
    pub fn new(
        request_id: impl Into<String>,
        message_id: impl Into<String>,
        step: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            message_id: message_id.into(),
            step: step.into(),
            text: text.into(),
            time: Utc::now(),
        }
    }
}

/// Durable state of a vectorization request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizationState {
    /// Identifier of the request this state belongs to
    pub request_id: String,

    /// Locator of the content being vectorized
    pub content_identifier: ContentIdentifier,

    /// Lifecycle status
    #[serde(default)]
    pub status: VectorizationStatus,

    /// Snapshot of the request, updated after every step transition
    pub request: VectorizationRequest,

    /// Step outputs accumulated so far
    #[serde(default)]
    pub artifacts: Vec<VectorizationArtifact>,

    /// Audit log of pipeline actions
    #[serde(default)]
    pub log: Vec<VectorizationLogEntry>,

    /// Detail of the last error, set when status is `Failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// When the state record was last written
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_time: DateTime<Utc>,
}

impl VectorizationState {
    /// Create a fresh `Pending` state for a request.
    pub fn from_request(request: &VectorizationRequest) -> Self {
        Self {
            request_id: request.id.clone(),
            content_identifier: request.content_identifier.clone(),
            status: VectorizationStatus::Pending,
            request: request.clone(),
            artifacts: Vec::new(),
            log: Vec::new(),
            last_error: None,
            updated_time: Utc::now(),
        }
    }

    /// Record an audit entry for a step action.
    pub fn log_step(
        &mut self,
        message_id: impl Into<String>,
        step: impl Into<String>,
        text: impl Into<String>,
    ) {
        self.log.push(VectorizationLogEntry::new(
            self.request_id.clone(),
            message_id,
            step,
            text,
        ));
    }

    /// Add an artifact, replacing any existing artifact with the same kind
    /// and position.
    pub fn add_or_replace_artifact(&mut self, artifact: VectorizationArtifact) {
        self.artifacts
            .retain(|a| !(a.kind == artifact.kind && a.position == artifact.position));
        self.artifacts.push(artifact);
    }

    /// Sync the embedded request snapshot and bump the update time.
    pub fn update_request(&mut self, request: &VectorizationRequest) {
        self.request = request.clone();
        self.updated_time = Utc::now();
    }

    /// Mark the state failed with an error detail.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = VectorizationStatus::Failed;
        self.last_error = Some(error.into());
        self.updated_time = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ProcessingType, VectorizationStep};

    fn sample_request() -> VectorizationRequest {
        VectorizationRequest::new(
            "object-1",
            ContentIdentifier::new("docs/report.pdf", "datasource-1"),
            ProcessingType::Asynchronous,
            vec![
                VectorizationStep::new("extract"),
                VectorizationStep::new("embed"),
            ],
        )
    }

    #[test]
    fn test_state_from_request() {
        let request = sample_request();
        let state = VectorizationState::from_request(&request);

        assert_eq!(state.request_id, request.id);
        assert_eq!(state.status, VectorizationStatus::Pending);
        assert!(state.artifacts.is_empty());
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_status_terminal() {
        assert!(!VectorizationStatus::Pending.is_terminal());
        assert!(!VectorizationStatus::InProgress.is_terminal());
        assert!(VectorizationStatus::Completed.is_terminal());
        assert!(VectorizationStatus::Failed.is_terminal());
    }

    #[test]
    fn test_add_or_replace_artifact() {
        let request = sample_request();
        let mut state = VectorizationState::from_request(&request);

        state.add_or_replace_artifact(VectorizationArtifact {
            kind: "extracted_text".to_string(),
            position: 0,
            content: "first".to_string(),
        });
        state.add_or_replace_artifact(VectorizationArtifact {
            kind: "extracted_text".to_string(),
            position: 0,
            content: "second".to_string(),
        });
        state.add_or_replace_artifact(VectorizationArtifact {
            kind: "extracted_text".to_string(),
            position: 1,
            content: "other position".to_string(),
        });

        assert_eq!(state.artifacts.len(), 2);
        let replaced = state
            .artifacts
            .iter()
            .find(|a| a.position == 0)
            .unwrap();
        assert_eq!(replaced.content, "second");
    }

    #[test]
    fn test_mark_failed_sets_error_detail() {
        let request = sample_request();
        let mut state = VectorizationState::from_request(&request);

        state.mark_failed("malformed content");
        assert_eq!(state.status, VectorizationStatus::Failed);
        assert_eq!(state.last_error.as_deref(), Some("malformed content"));
    }

    #[test]
    fn test_log_step() {
        let request = sample_request();
        let mut state = VectorizationState::from_request(&request);

        state.log_step("msg-1", "extract", "Started handling step.");
        assert_eq!(state.log.len(), 1);
        assert_eq!(state.log[0].step, "extract");
        assert_eq!(state.log[0].request_id, request.id);
    }

    #[test]
    fn test_state_serialization_roundtrip() {
        let request = sample_request();
        let mut state = VectorizationState::from_request(&request);
        state.mark_failed("boom");

        let json = serde_json::to_string(&state).unwrap();
        let decoded: VectorizationState = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.status, VectorizationStatus::Failed);
        assert_eq!(decoded.last_error.as_deref(), Some("boom"));
    }
}
