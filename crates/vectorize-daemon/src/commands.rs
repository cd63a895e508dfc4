//! Daemon command implementations.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vectorize_state::FileStateService;
use vectorize_types::{QueuingEngine, Settings};
use vectorize_worker::{HandlerRegistry, NoopStepHandler, VectorizationWorkerBuilder};

/// Run the vectorization worker in the foreground.
///
/// 1. Load configuration (defaults -> file -> env -> CLI)
/// 2. Open the file-backed state store
/// 3. Build and run the worker
/// 4. Handle graceful shutdown on SIGINT/SIGTERM
pub async fn run_worker(
    config_path: Option<&str>,
    state_path_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<()> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    // CLI overrides take highest precedence.
    if let Some(state_path) = state_path_override {
        settings.state_path = state_path.to_string();
    }
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Vectorize daemon starting...");
    info!("Configuration:");
    info!("  State path: {}", settings.state_path);
    info!("  Queuing engine: {:?}", settings.worker.queuing_engine);
    info!(
        "  Request managers: {}",
        settings.worker.request_managers.len()
    );
    info!("  Log level: {}", settings.log_level);

    check_settings(&settings)?;

    let state_service = Arc::new(
        FileStateService::open(&settings.state_path)
            .await
            .context("Failed to open state store")?,
    );

    // Until real step handlers are registered through the library API, each
    // configured source gets a pass-through handler.
    let mut handlers = HandlerRegistry::new();
    for source in &settings.worker.request_sources {
        warn!(
            step = %source.name,
            "No handler registered for step; using pass-through handler"
        );
        handlers.register(Arc::new(NoopStepHandler::new(source.name.clone())));
    }

    let cancellation_token = CancellationToken::new();
    let worker = VectorizationWorkerBuilder::new()
        .with_settings(settings.worker.clone())
        .with_state_service(state_service)
        .with_handler_registry(handlers)
        .with_cancellation_token(cancellation_token.clone())
        .build()
        .await
        .context("Failed to build vectorization worker")?;

    tokio::spawn(async move {
        shutdown_signal().await;
        cancellation_token.cancel();
    });

    worker.run().await;
    info!("Vectorize daemon stopped");
    Ok(())
}

/// Load and validate the configuration without starting the worker.
pub fn validate_config(config_path: Option<&str>) -> Result<()> {
    let settings = Settings::load(config_path).context("Failed to load configuration")?;
    check_settings(&settings)?;

    println!("Configuration is valid.");
    println!("  Queuing engine: {:?}", settings.worker.queuing_engine);
    println!("  State path: {}", settings.state_path);
    for manager in &settings.worker.request_managers {
        println!(
            "  Manager [{}]: {} handler instance(s), {} max retries",
            manager.request_source_name, manager.max_handler_instances, manager.queue_max_retries
        );
    }
    Ok(())
}

/// Structural checks shared by `run` and `validate`.
fn check_settings(settings: &Settings) -> Result<()> {
    if settings.worker.request_managers.is_empty() {
        bail!("no request managers configured");
    }
    for manager in &settings.worker.request_managers {
        let source = settings
            .worker
            .request_source(&manager.request_source_name)
            .with_context(|| {
                format!(
                    "request manager references unconfigured source [{}]",
                    manager.request_source_name
                )
            })?;
        if settings.worker.queuing_engine == QueuingEngine::Redis
            && source.connection_url.is_none()
        {
            bail!(
                "request source [{}] needs a connection_url for the redis queuing engine",
                source.name
            );
        }
        if manager.max_handler_instances == 0 {
            bail!(
                "request manager [{}] must allow at least one handler instance",
                manager.request_source_name
            );
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
