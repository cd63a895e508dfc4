//! Vectorization request type.
//!
//! A request is one unit of pipeline work: a piece of content moving through
//! an ordered list of named steps (extract, partition, embed, index). The
//! step order is fixed at submission time; request managers advance the
//! request by moving exactly one step id from `remaining_steps` to
//! `completed_steps` per successful execution.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::VectorizationError;

/// How the caller expects the request to be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingType {
    /// The caller blocks until the full pipeline reaches a terminal state.
    Synchronous,
    /// Fire-and-forget; the caller polls the persisted state for progress.
    #[default]
    Asynchronous,
}

/// Opaque locator of the content being processed.
///
/// Resolved by extraction handlers, not by the execution core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentIdentifier {
    /// Canonical path or composite identifier into the content source
    pub canonical_id: String,

    /// Identifier of the data source definition driving this request
    pub data_source_object_id: String,

    /// Additional locator metadata (container names, item paths, etc.)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ContentIdentifier {
    /// Create a new content identifier.
    pub fn new(canonical_id: impl Into<String>, data_source_object_id: impl Into<String>) -> Self {
        Self {
            canonical_id: canonical_id.into(),
            data_source_object_id: data_source_object_id.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach locator metadata.
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A named, parameterized pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizationStep {
    /// Unique step name within the request ("extract", "partition", ...)
    pub id: String,

    /// String-keyed parameters consumed by the step handler
    /// (e.g., `{"indexing_profile_name": "..."}`)
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

impl VectorizationStep {
    /// Create a step with no parameters.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parameters: HashMap::new(),
        }
    }

    /// Create a step with parameters.
    pub fn with_parameters(id: impl Into<String>, parameters: HashMap<String, String>) -> Self {
        Self {
            id: id.into(),
            parameters,
        }
    }
}

/// A vectorization request.
///
/// Invariant: `remaining_steps` followed by `completed_steps`, reordered to
/// step order, always reconstructs the ids of `steps`, and a step id is in
/// exactly one of the two lists at any observation point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizationRequest {
    /// Unique identifier of the request (ULID string)
    pub id: String,

    /// Identifier of the content/data-source definition driving this request
    pub object_id: String,

    /// Locator of the content being vectorized
    pub content_identifier: ContentIdentifier,

    /// How the request should be processed
    #[serde(default)]
    pub processing_type: ProcessingType,

    /// Ordered pipeline steps; fixed at submission time
    pub steps: Vec<VectorizationStep>,

    /// Ordered names of steps already executed successfully
    #[serde(default)]
    pub completed_steps: Vec<String>,

    /// Ordered names of steps still to be executed
    #[serde(default)]
    pub remaining_steps: Vec<String>,

    /// Number of consecutive processing errors for the current step
    #[serde(default)]
    pub error_count: u32,

    /// When the request was submitted
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub submitted_time: DateTime<Utc>,

    /// When a step last completed successfully, if ever
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_successful_step_time: Option<DateTime<Utc>>,
}

impl VectorizationRequest {
    /// Create a new request with a generated id and all steps remaining.
    pub fn new(
        object_id: impl Into<String>,
        content_identifier: ContentIdentifier,
        processing_type: ProcessingType,
        steps: Vec<VectorizationStep>,
    ) -> Self {
        let remaining_steps = steps.iter().map(|s| s.id.clone()).collect();
        Self {
            id: ulid::Ulid::new().to_string(),
            object_id: object_id.into(),
            content_identifier,
            processing_type,
            steps,
            completed_steps: Vec::new(),
            remaining_steps,
            error_count: 0,
            submitted_time: Utc::now(),
            last_successful_step_time: None,
        }
    }

    /// The name of the step to be executed next, if any.
    pub fn current_step(&self) -> Option<&str> {
        self.remaining_steps.first().map(String::as_str)
    }

    /// Whether all steps have been executed.
    pub fn is_complete(&self) -> bool {
        self.remaining_steps.is_empty()
    }

    /// The pipeline step definition with the given name.
    pub fn step(&self, id: &str) -> Option<&VectorizationStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Advance the pipeline to the next step.
    ///
    /// Moves the first remaining step name into `completed_steps`, resets the
    /// error count, and stamps the successful step time. Returns the name of
    /// the step just completed and the name of the next step to execute, or
    /// `None` if the pipeline is finished.
    ///
    /// # Errors
    ///
    /// Returns `VectorizationError::NoRemainingSteps` if there is nothing
    /// left to advance.
    pub fn advance(&mut self) -> Result<(String, Option<String>), VectorizationError> {
        if self.remaining_steps.is_empty() {
            return Err(VectorizationError::NoRemainingSteps(self.id.clone()));
        }

        let previous = self.remaining_steps.remove(0);
        self.completed_steps.push(previous.clone());
        self.error_count = 0;
        self.last_successful_step_time = Some(Utc::now());

        let next = self.remaining_steps.first().cloned();
        Ok((previous, next))
    }

    /// Revert the pipeline to the previously completed step.
    ///
    /// Moves the last completed step name back to the front of
    /// `remaining_steps` and returns it.
    ///
    /// # Errors
    ///
    /// Returns `VectorizationError::NoCompletedSteps` if no step has
    /// completed yet.
    pub fn rollback_to_previous_step(&mut self) -> Result<String, VectorizationError> {
        let step = self
            .completed_steps
            .pop()
            .ok_or_else(|| VectorizationError::NoCompletedSteps(self.id.clone()))?;
        self.remaining_steps.insert(0, step.clone());
        Ok(step)
    }

    /// Whether the request has been idle longer than `max_idle`.
    ///
    /// Idle time is measured from the last successful step, or from
    /// submission if no step has completed yet. Expired requests are removed
    /// from their source and marked failed rather than retried forever.
    pub fn is_expired(&self, max_idle: Duration) -> bool {
        let reference = self.last_successful_step_time.unwrap_or(self.submitted_time);
        Utc::now() - reference > max_idle
    }

    /// Validate that the request is well formed for submission.
    ///
    /// # Errors
    ///
    /// Returns `VectorizationError::InvalidRequest` when the step list is
    /// empty, contains duplicate names, or the remaining/completed partition
    /// does not cover the step list.
    pub fn validate(&self) -> Result<(), VectorizationError> {
        if self.steps.is_empty() {
            return Err(VectorizationError::InvalidRequest(format!(
                "request {} has no steps",
                self.id
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(VectorizationError::InvalidRequest(format!(
                    "request {} has a step with an empty name",
                    self.id
                )));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(VectorizationError::InvalidRequest(format!(
                    "request {} has duplicate step [{}]",
                    self.id, step.id
                )));
            }
        }

        let partition: Vec<&str> = self
            .completed_steps
            .iter()
            .chain(self.remaining_steps.iter())
            .map(String::as_str)
            .collect();
        let expected: Vec<&str> = self.steps.iter().map(|s| s.id.as_str()).collect();
        if partition != expected {
            return Err(VectorizationError::InvalidRequest(format!(
                "request {} remaining/completed steps do not partition the step list",
                self.id
            )));
        }

        Ok(())
    }

    /// Serialize to JSON bytes for queue transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
