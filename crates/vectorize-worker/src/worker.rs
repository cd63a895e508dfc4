//! The worker: a set of request managers running as one unit.

use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::manager::RequestManagerService;

/// Runs all configured request managers until cancellation.
///
/// Built by [`crate::VectorizationWorkerBuilder`]; each manager polls its own
/// request source on its own task.
pub struct VectorizationWorker {
    managers: Vec<Arc<RequestManagerService>>,
    cancellation_token: CancellationToken,
}

impl VectorizationWorker {
    pub(crate) fn new(
        managers: Vec<Arc<RequestManagerService>>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            managers,
            cancellation_token,
        }
    }

    /// The cancellation token shared with all managers. Cancelling it stops
    /// the worker.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Number of request managers this worker runs.
    pub fn manager_count(&self) -> usize {
        self.managers.len()
    }

    /// Run every manager loop to completion.
    ///
    /// Returns once all managers have observed cancellation and drained.
    pub async fn run(&self) {
        info!(managers = self.managers.len(), "Vectorization worker starting");

        let mut tasks = JoinSet::new();
        for manager in &self.managers {
            let manager = Arc::clone(manager);
            tasks.spawn(async move {
                manager.run().await;
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Request manager task failed");
            }
        }

        info!("Vectorization worker stopped");
    }

    /// Signal all managers to stop after their current pass.
    pub fn stop(&self) {
        self.cancellation_token.cancel();
    }
}
