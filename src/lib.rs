//! Metrics-anomaly pipeline: ranks each ingested event's metrics against a
//! sliding window of recent history, classifies its severity, and streams
//! qualifying events to live WebSocket observers.

use std::sync::Arc;

pub mod config;
pub mod generator;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod server;

pub use crate::config::PulseConfig;
pub use pipeline::IngestionPipeline;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// The ingestion pipeline; owns histograms, events and observers.
    pub pipeline: Arc<IngestionPipeline>,

    /// Directory served as the fallback for non-API paths.
    pub static_dir: String,
}

impl AppState {
    pub fn new(pipeline: Arc<IngestionPipeline>, static_dir: impl Into<String>) -> Self {
        Self {
            pipeline,
            static_dir: static_dir.into(),
        }
    }
}
