pub mod collector;
pub mod stream;

pub use collector::{Gauges, IngestSample, LatencySummary, MetricsCollector, StatsSnapshot};
