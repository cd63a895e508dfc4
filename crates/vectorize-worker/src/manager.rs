//! Request manager: the per-source lease/execute/route loop.
//!
//! One manager exists per configured pipeline stage. It leases requests from
//! its bound source, executes the step handler for each request's first
//! remaining step under a bounded task pool, and re-routes the request based
//! on the outcome:
//!
//! - success: the step moves to `completed_steps`, the updated state is
//!   persisted, the lease is completed, and the request is submitted to the
//!   source of its next remaining step (or marked `Completed`);
//! - retryable failure: the error count is persisted into the queued payload
//!   and the lease is left to expire, yielding an automatic redelivery;
//! - non-retryable failure, expiry, or retry exhaustion: the lease is
//!   completed and the state is marked `Failed`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vectorize_queue::{LeasedRequest, RequestSourceService};
use vectorize_state::StateStore;
use vectorize_types::{
    RequestManagerSettings, VectorizationRequest, VectorizationState, VectorizationStatus,
};

use crate::error::WorkerError;
use crate::handler::{HandlerFailure, HandlerRegistry};
use crate::task_pool::TaskPool;

/// Manages vectorization requests originating from one request source.
pub struct RequestManagerService {
    settings: RequestManagerSettings,
    sources: HashMap<String, Arc<dyn RequestSourceService>>,
    incoming: Arc<dyn RequestSourceService>,
    state_service: Arc<dyn StateStore>,
    handlers: Arc<HandlerRegistry>,
    task_pool: TaskPool,
    cancellation_token: CancellationToken,
}

impl RequestManagerService {
    /// Create a manager bound to the source named in its settings.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::UnknownRequestSource` when the named source is
    /// not in the provided source map.
    pub fn new(
        settings: RequestManagerSettings,
        sources: HashMap<String, Arc<dyn RequestSourceService>>,
        state_service: Arc<dyn StateStore>,
        handlers: Arc<HandlerRegistry>,
        cancellation_token: CancellationToken,
    ) -> Result<Self, WorkerError> {
        let incoming = sources
            .get(&settings.request_source_name)
            .cloned()
            .ok_or_else(|| {
                WorkerError::UnknownRequestSource(settings.request_source_name.clone())
            })?;
        let task_pool = TaskPool::new(settings.max_handler_instances);

        Ok(Self {
            settings,
            sources,
            incoming,
            state_service,
            handlers,
            task_pool,
            cancellation_token,
        })
    }

    /// The name of the source this manager consumes.
    pub fn source_name(&self) -> &str {
        &self.settings.request_source_name
    }

    /// Run the processing loop until cancellation.
    ///
    /// Errors inside the loop are logged and do not terminate it; in-flight
    /// executions are left to finish and commit when cancellation fires.
    pub async fn run(self: Arc<Self>) {
        info!(
            source = %self.settings.request_source_name,
            "Request manager started processing requests"
        );

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            match self.run_once().await {
                Ok(received_any) => {
                    let pause = if received_any {
                        Duration::from_secs(self.settings.queue_processing_pace_secs)
                    } else {
                        Duration::from_secs(self.settings.queue_polling_interval_secs)
                    };
                    if self.wait(pause).await {
                        break;
                    }
                }
                Err(e) => {
                    error!(
                        source = %self.settings.request_source_name,
                        error = %e,
                        "Error in request processing loop"
                    );
                    let pause = Duration::from_secs(self.settings.queue_polling_interval_secs);
                    if self.wait(pause).await {
                        break;
                    }
                }
            }
        }

        info!(
            source = %self.settings.request_source_name,
            "Request manager finished processing requests"
        );
    }

    /// One receive/dispatch pass. Returns whether any request was received.
    async fn run_once(self: &Arc<Self>) -> Result<bool, WorkerError> {
        let capacity = self.task_pool.available_capacity();
        if capacity == 0 || !self.incoming.has_requests().await? {
            return Ok(false);
        }

        let leased = self.incoming.receive_requests(capacity).await?;
        if leased.is_empty() {
            return Ok(false);
        }

        for leased_request in leased {
            let request_id = leased_request.request.id.clone();

            if self.is_poisoned(&leased_request) {
                self.fail_poisoned(leased_request).await?;
                continue;
            }

            // Duplicate delivery: this process is already executing the
            // request. Leave the lease to expire so the message survives if
            // the in-flight execution dies before committing.
            if self.task_pool.has_running_task_for(&request_id) {
                warn!(
                    source = %self.settings.request_source_name,
                    request_id = %request_id,
                    "Duplicate delivery of a request already executing; skipping"
                );
                continue;
            }

            if !self.task_pool.try_reserve(&request_id) {
                // Capacity raced away since the receive; the remaining leases
                // simply expire and redeliver.
                debug!(
                    source = %self.settings.request_source_name,
                    request_id = %request_id,
                    "No free slot for received request; leaving it to redeliver"
                );
                continue;
            }

            let manager = Arc::clone(self);
            let handle = tokio::spawn(async move {
                manager.process_request(leased_request).await;
            });
            self.task_pool.attach(&request_id, handle);
        }

        Ok(true)
    }

    /// Cancellation-aware sleep; returns true when cancellation fired.
    async fn wait(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancellation_token.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    fn is_poisoned(&self, leased: &LeasedRequest) -> bool {
        let max_idle = chrono::Duration::seconds(self.settings.request_expiration_secs as i64);
        leased.request.is_expired(max_idle)
            || leased.request.error_count > self.settings.queue_max_retries
    }

    /// Remove an expired or retry-exhausted request from the source and mark
    /// its state failed.
    async fn fail_poisoned(&self, leased: LeasedRequest) -> Result<(), WorkerError> {
        let request = &leased.request;
        let reason = if request.error_count > self.settings.queue_max_retries {
            format!(
                "request {} encountered {} consecutive errors and will be deleted",
                request.id, request.error_count
            )
        } else {
            format!(
                "request {} has expired and will be deleted (last successful step: {:?})",
                request.id, request.last_successful_step_time
            )
        };
        warn!(
            source = %self.settings.request_source_name,
            request_id = %request.id,
            message_id = %leased.message_id,
            "{reason}"
        );

        let mut state = self.read_or_create_state(request).await?;
        state.log_step(
            &leased.message_id,
            request.current_step().unwrap_or("n/a"),
            &reason,
        );
        state.mark_failed(&reason);

        self.incoming
            .delete_request(&leased.message_id, &leased.receipt)
            .await?;
        self.state_service.upsert_state(&state).await?;
        Ok(())
    }

    async fn read_or_create_state(
        &self,
        request: &VectorizationRequest,
    ) -> Result<VectorizationState, WorkerError> {
        if self.state_service.has_state(&request.id).await? {
            Ok(self.state_service.read_state(&request.id).await?)
        } else {
            Ok(VectorizationState::from_request(request))
        }
    }

    /// Execute one step for a leased request and route the outcome.
    async fn process_request(&self, leased: LeasedRequest) {
        let request_id = leased.request.id.clone();
        if let Err(e) = self.try_process(leased).await {
            error!(
                source = %self.settings.request_source_name,
                request_id = %request_id,
                error = %e,
                "Error processing request"
            );
        }
    }

    async fn try_process(&self, leased: LeasedRequest) -> Result<(), WorkerError> {
        let mut request = leased.request.clone();

        let Some(step_name) = request.current_step().map(str::to_string) else {
            // Nothing left to do; complete the stray message.
            self.incoming
                .delete_request(&leased.message_id, &leased.receipt)
                .await?;
            return Ok(());
        };

        let mut state = self.read_or_create_state(&request).await?;
        state.status = VectorizationStatus::InProgress;
        state.log_step(&leased.message_id, &step_name, "Started handling step.");
        self.state_service.upsert_state(&state).await?;

        let outcome = self.execute_step(&request, &mut state, &step_name).await;

        match outcome {
            Ok(()) => {
                state.log_step(&leased.message_id, &step_name, "Finished handling step.");
                self.advance_request(&mut request, &mut state, &leased)
                    .await
            }
            Err(failure) if failure.retryable => {
                self.retry_request(&mut request, &mut state, &leased, &step_name, &failure)
                    .await
            }
            Err(failure) => {
                self.fail_request(&mut request, &mut state, &leased, &step_name, &failure)
                    .await
            }
        }
    }

    async fn execute_step(
        &self,
        request: &VectorizationRequest,
        state: &mut VectorizationState,
        step_name: &str,
    ) -> Result<(), HandlerFailure> {
        // An unregistered step name cannot succeed on retry.
        let handler = match self.handlers.resolve(step_name) {
            Ok(handler) => handler,
            Err(e) => return Err(HandlerFailure::fatal(e.to_string())),
        };

        let parameters = request
            .step(step_name)
            .map(|s| s.parameters.clone())
            .unwrap_or_default();

        match self.settings.step_timeout_secs {
            Some(secs) => {
                let deadline = Duration::from_secs(secs);
                match tokio::time::timeout(deadline, handler.execute(request, state, &parameters))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(HandlerFailure::retryable(format!(
                        "step [{step_name}] exceeded its {secs}s execution deadline"
                    ))),
                }
            }
            None => handler.execute(request, state, &parameters).await,
        }
    }

    /// Success path: commit the step transition, complete the lease, and
    /// route the request to its next source or to the finished state.
    async fn advance_request(
        &self,
        request: &mut VectorizationRequest,
        state: &mut VectorizationState,
        leased: &LeasedRequest,
    ) -> Result<(), WorkerError> {
        let (previous, next) = request.advance()?;

        state.update_request(request);
        if next.is_none() {
            state.status = VectorizationStatus::Completed;
        }
        // State must be durable before the message leaves the queue; a crash
        // in between redelivers the message, not loses the work.
        self.state_service.upsert_state(state).await?;
        self.incoming
            .delete_request(&leased.message_id, &leased.receipt)
            .await?;

        match next {
            Some(next_step) => {
                let source = self
                    .sources
                    .get(&next_step)
                    .ok_or_else(|| WorkerError::UnknownRequestSource(next_step.clone()))?;
                source.submit_request(request).await?;
                info!(
                    request_id = %request.id,
                    previous_step = %previous,
                    next_step = %next_step,
                    "Pipeline advanced to next step"
                );
            }
            None => {
                info!(
                    request_id = %request.id,
                    previous_step = %previous,
                    "Pipeline advanced to finalized state"
                );
            }
        }
        Ok(())
    }

    /// Retryable failure path: persist the error and let the lease expire.
    async fn retry_request(
        &self,
        request: &mut VectorizationRequest,
        state: &mut VectorizationState,
        leased: &LeasedRequest,
        step_name: &str,
        failure: &HandlerFailure,
    ) -> Result<(), WorkerError> {
        request.error_count += 1;
        state.update_request(request);
        state.log_step(
            &leased.message_id,
            step_name,
            format!("ERROR: {} (will retry)", failure.message),
        );
        self.state_service.upsert_state(state).await?;
        self.incoming
            .update_request(&leased.message_id, &leased.receipt, request)
            .await?;

        warn!(
            request_id = %request.id,
            step = %step_name,
            error_count = request.error_count,
            error = %failure.message,
            "Step failed; request will be redelivered after the lease expires"
        );
        Ok(())
    }

    /// Non-retryable failure path: complete the lease and terminate the
    /// pipeline with a failed state.
    async fn fail_request(
        &self,
        request: &mut VectorizationRequest,
        state: &mut VectorizationState,
        leased: &LeasedRequest,
        step_name: &str,
        failure: &HandlerFailure,
    ) -> Result<(), WorkerError> {
        state.update_request(request);
        state.log_step(
            &leased.message_id,
            step_name,
            format!("ERROR: {}", failure.message),
        );
        state.mark_failed(&failure.message);
        self.state_service.upsert_state(state).await?;
        self.incoming
            .delete_request(&leased.message_id, &leased.receipt)
            .await?;

        warn!(
            request_id = %request.id,
            step = %step_name,
            error = %failure.message,
            "Step failed permanently; pipeline terminated"
        );
        Ok(())
    }
}
