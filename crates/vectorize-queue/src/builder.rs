//! Builder for the map of request sources used by a worker.

use std::collections::HashMap;
use std::sync::Arc;

use vectorize_types::{QueuingEngine, RequestSourceSettings};

use crate::error::QueueError;
use crate::memory::MemoryRequestSourceService;
use crate::redis_source::RedisRequestSourceService;
use crate::RequestSourceService;

/// Builds a dictionary of request sources keyed by source name, selecting
/// the backend from the configured queuing engine.
#[derive(Default)]
pub struct RequestSourcesBuilder {
    settings: Option<Vec<RequestSourceSettings>>,
    queuing: QueuingEngine,
}

impl RequestSourcesBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-source settings.
    pub fn with_settings(mut self, settings: Vec<RequestSourceSettings>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Set the queue backend selector.
    pub fn with_queuing(mut self, queuing: QueuingEngine) -> Self {
        self.queuing = queuing;
        self
    }

    /// Build the request sources.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Configuration` when the settings are missing or
    /// empty, a source name is blank or duplicated, or a Redis source has no
    /// connection URL.
    pub async fn build(
        self,
    ) -> Result<HashMap<String, Arc<dyn RequestSourceService>>, QueueError> {
        let settings = self.settings.ok_or_else(|| {
            QueueError::Configuration("request source settings are not set".to_string())
        })?;
        if settings.is_empty() {
            return Err(QueueError::Configuration(
                "at least one request source must be configured".to_string(),
            ));
        }

        let mut sources: HashMap<String, Arc<dyn RequestSourceService>> = HashMap::new();

        for source_settings in &settings {
            if source_settings.name.trim().is_empty() {
                return Err(QueueError::Configuration(
                    "request source names must not be empty".to_string(),
                ));
            }
            if sources.contains_key(&source_settings.name) {
                return Err(QueueError::Configuration(format!(
                    "duplicate request source name [{}]",
                    source_settings.name
                )));
            }

            let source: Arc<dyn RequestSourceService> = match self.queuing {
                QueuingEngine::None => {
                    Arc::new(MemoryRequestSourceService::new(source_settings))
                }
                QueuingEngine::Redis => {
                    Arc::new(RedisRequestSourceService::connect(source_settings).await?)
                }
            };
            sources.insert(source_settings.name.clone(), source);
        }

        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str) -> RequestSourceSettings {
        RequestSourceSettings {
            name: name.to_string(),
            connection_url: None,
            visibility_timeout_secs: 30,
        }
    }

    #[tokio::test]
    async fn test_builds_memory_sources() {
        let sources = RequestSourcesBuilder::new()
            .with_settings(vec![source("extract"), source("partition")])
            .with_queuing(QueuingEngine::None)
            .build()
            .await
            .unwrap();

        assert_eq!(sources.len(), 2);
        assert_eq!(sources["extract"].source_name(), "extract");
    }

    #[tokio::test]
    async fn test_missing_settings_fails() {
        let result = RequestSourcesBuilder::new().build().await;
        assert!(matches!(result, Err(QueueError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_empty_settings_fails() {
        let result = RequestSourcesBuilder::new()
            .with_settings(vec![])
            .build()
            .await;
        assert!(matches!(result, Err(QueueError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_blank_source_name_fails() {
        let result = RequestSourcesBuilder::new()
            .with_settings(vec![source("  ")])
            .build()
            .await;
        assert!(matches!(result, Err(QueueError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_duplicate_source_name_fails() {
        let result = RequestSourcesBuilder::new()
            .with_settings(vec![source("extract"), source("extract")])
            .build()
            .await;
        assert!(matches!(result, Err(QueueError::Configuration(_))));
    }
}
