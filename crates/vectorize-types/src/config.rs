//! Configuration for the vectorization worker.
//!
//! Layered loading: defaults -> config file -> VECTORIZE_* env vars.
//! CLI flags are applied by the caller after loading.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::VectorizationError;

/// Queue backend used by the request sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueuingEngine {
    /// In-process queues; single-node and test deployments
    #[default]
    None,
    /// Redis-backed queues with crash-survivable storage and
    /// distributed visibility timeouts
    Redis,
}

/// Settings for one request source (one pipeline stage's queue).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSourceSettings {
    /// Source name; must match the step name it serves
    pub name: String,

    /// Backend connection URL; required when the queuing engine is `Redis`
    #[serde(default)]
    pub connection_url: Option<String>,

    /// How long a received request stays invisible to other consumers
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
}

fn default_visibility_timeout_secs() -> u64 {
    30
}

/// Settings for one request manager (one per pipeline stage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestManagerSettings {
    /// Name of the request source this manager consumes
    pub request_source_name: String,

    /// Maximum number of concurrently executing step handler instances
    #[serde(default = "default_max_handler_instances")]
    pub max_handler_instances: usize,

    /// Requests with more consecutive errors than this are removed and failed
    #[serde(default = "default_queue_max_retries")]
    pub queue_max_retries: u32,

    /// Seconds to wait before polling an idle or saturated source again
    #[serde(default = "default_queue_polling_interval_secs")]
    pub queue_polling_interval_secs: u64,

    /// Seconds to pace successive receive batches by
    #[serde(default = "default_queue_processing_pace_secs")]
    pub queue_processing_pace_secs: u64,

    /// Requests idle longer than this are considered expired and failed
    #[serde(default = "default_request_expiration_secs")]
    pub request_expiration_secs: u64,

    /// Per-step execution deadline in seconds. A handler overrunning the
    /// deadline is treated as a retryable failure. When unset, handler
    /// runtime is bounded only by the source's visibility timeout.
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,
}

impl Default for RequestManagerSettings {
    fn default() -> Self {
        Self {
            request_source_name: String::new(),
            max_handler_instances: default_max_handler_instances(),
            queue_max_retries: default_queue_max_retries(),
            queue_polling_interval_secs: default_queue_polling_interval_secs(),
            queue_processing_pace_secs: default_queue_processing_pace_secs(),
            request_expiration_secs: default_request_expiration_secs(),
            step_timeout_secs: None,
        }
    }
}

fn default_max_handler_instances() -> usize {
    1
}

fn default_queue_max_retries() -> u32 {
    5
}

fn default_queue_polling_interval_secs() -> u64 {
    5
}

fn default_queue_processing_pace_secs() -> u64 {
    1
}

fn default_request_expiration_secs() -> u64 {
    3600
}

/// Settings for a vectorization worker deployment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkerSettings {
    /// One entry per pipeline stage to be processed by this worker
    #[serde(default)]
    pub request_managers: Vec<RequestManagerSettings>,

    /// The request sources available to the managers
    #[serde(default)]
    pub request_sources: Vec<RequestSourceSettings>,

    /// Queue backend selector
    #[serde(default)]
    pub queuing_engine: QueuingEngine,
}

impl WorkerSettings {
    /// The settings for a named request source, if configured.
    pub fn request_source(&self, name: &str) -> Option<&RequestSourceSettings> {
        self.request_sources.iter().find(|rs| rs.name == name)
    }
}

/// Main application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Worker configuration
    #[serde(default)]
    pub worker: WorkerSettings,

    /// Directory for the file-backed state store
    #[serde(default = "default_state_path")]
    pub state_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_state_path() -> String {
    ProjectDirs::from("", "", "vectorize")
        .map(|p| p.data_local_dir().join("state"))
        .unwrap_or_else(|| PathBuf::from("./state"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            worker: WorkerSettings::default(),
            state_path: default_state_path(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/vectorize/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (VECTORIZE_*)
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, VectorizationError> {
        let config_dir = ProjectDirs::from("", "", "vectorize")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("state_path", default_state_path())
            .map_err(|e| VectorizationError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| VectorizationError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: VECTORIZE_STATE_PATH, VECTORIZE_LOG_LEVEL, etc.
        builder = builder.add_source(
            Environment::with_prefix("VECTORIZE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| VectorizationError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| VectorizationError::Config(e.to_string()))
    }
}
