//! Builder that validates configuration and assembles a worker.

use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use vectorize_queue::{RequestSourceService, RequestSourcesBuilder};
use vectorize_state::StateStore;
use vectorize_types::WorkerSettings;

use crate::error::WorkerError;
use crate::handler::HandlerRegistry;
use crate::manager::RequestManagerService;
use crate::worker::VectorizationWorker;

/// Assembles a [`VectorizationWorker`] from settings, a state store, and a
/// handler registry.
///
/// The builder is the single place configuration is validated: every request
/// manager must reference a configured request source, and the worker must
/// have at least one manager. Request sources are normally built from the
/// settings' queuing engine, but a pre-built map can be injected for tests.
#[derive(Default)]
pub struct VectorizationWorkerBuilder {
    settings: Option<WorkerSettings>,
    state_service: Option<Arc<dyn StateStore>>,
    handlers: Option<HandlerRegistry>,
    sources: Option<HashMap<String, Arc<dyn RequestSourceService>>>,
    cancellation_token: Option<CancellationToken>,
}

impl VectorizationWorkerBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker settings.
    pub fn with_settings(mut self, settings: WorkerSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Set the state store.
    pub fn with_state_service(mut self, state_service: Arc<dyn StateStore>) -> Self {
        self.state_service = Some(state_service);
        self
    }

    /// Set the step handler registry.
    pub fn with_handler_registry(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Inject pre-built request sources instead of building them from the
    /// settings' queuing engine.
    pub fn with_request_sources(
        mut self,
        sources: HashMap<String, Arc<dyn RequestSourceService>>,
    ) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Set the cancellation token shared by all managers. A fresh token is
    /// created when not provided.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Validate the configuration and build the worker.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Configuration` when settings, the state store,
    /// or managers are missing, and `WorkerError::UnknownRequestSource` when
    /// a manager references a source that is not configured.
    pub async fn build(self) -> Result<VectorizationWorker, WorkerError> {
        let settings = self
            .settings
            .ok_or_else(|| WorkerError::Configuration("worker settings are not set".to_string()))?;
        let state_service = self
            .state_service
            .ok_or_else(|| WorkerError::Configuration("state service is not set".to_string()))?;
        if settings.request_managers.is_empty() {
            return Err(WorkerError::Configuration(
                "at least one request manager must be configured".to_string(),
            ));
        }

        let handlers = Arc::new(self.handlers.unwrap_or_default());
        let cancellation_token = self.cancellation_token.unwrap_or_default();

        let sources = match self.sources {
            Some(sources) => sources,
            None => {
                RequestSourcesBuilder::new()
                    .with_settings(settings.request_sources.clone())
                    .with_queuing(settings.queuing_engine)
                    .build()
                    .await?
            }
        };

        let mut managers = Vec::with_capacity(settings.request_managers.len());
        for manager_settings in settings.request_managers {
            let manager = RequestManagerService::new(
                manager_settings,
                sources.clone(),
                Arc::clone(&state_service),
                Arc::clone(&handlers),
                cancellation_token.clone(),
            )?;
            managers.push(Arc::new(manager));
        }

        info!(
            managers = managers.len(),
            sources = sources.len(),
            "Vectorization worker assembled"
        );
        Ok(VectorizationWorker::new(managers, cancellation_token))
    }
}
