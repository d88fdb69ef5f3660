//! Service configuration

use anyhow::Result;
use serde::Deserialize;

use crate::pipeline::PipelineOptions;

/// Runtime settings, read from `PULSE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct PulseConfig {
    /// Address the HTTP/WebSocket listener binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Directory holding the dashboard's static assets
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Silent synthetic events ingested before serving
    #[serde(default = "default_warmup_count")]
    pub warmup_count: usize,

    /// Observations kept per metric key
    #[serde(default = "default_histogram_capacity")]
    pub histogram_capacity: usize,

    /// Stored events before the oldest is evicted; 0 disables eviction
    #[serde(default = "default_registry_capacity")]
    pub registry_capacity: usize,

    /// Buffered messages per observer before it is dropped
    #[serde(default = "default_observer_queue")]
    pub observer_queue: usize,

    /// Emit logs as JSON lines instead of human-readable text
    #[serde(default)]
    pub log_json: bool,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_static_dir() -> String {
    "public".to_string()
}

fn default_warmup_count() -> usize {
    500
}

fn default_histogram_capacity() -> usize {
    crate::pipeline::CAPACITY
}

fn default_registry_capacity() -> usize {
    crate::pipeline::registry::DEFAULT_RETENTION
}

fn default_observer_queue() -> usize {
    crate::pipeline::broadcast::DEFAULT_QUEUE_DEPTH
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            static_dir: default_static_dir(),
            warmup_count: default_warmup_count(),
            histogram_capacity: default_histogram_capacity(),
            registry_capacity: default_registry_capacity(),
            observer_queue: default_observer_queue(),
            log_json: false,
        }
    }
}

impl PulseConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("PULSE").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            histogram_capacity: self.histogram_capacity,
            registry_capacity: self.registry_capacity,
            observer_queue: self.observer_queue,
        }
    }
}
