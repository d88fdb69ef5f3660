//! Ingestion → histogram → percentile → classification → broadcast.
//!
//! [`IngestionPipeline`] owns one of each component and runs a single event
//! through them. Components never share storage; values cross between them
//! by copy.

pub mod broadcast;
pub mod classifier;
pub mod error;
pub mod histogram;
pub mod model;
pub mod percentile;
pub mod registry;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::metrics::{Gauges, IngestSample, MetricsCollector, StatsSnapshot};

pub use broadcast::{BroadcastHub, Delivery, ObserverId, Subscription};
pub use classifier::{Classification, OutlierClassifier};
pub use error::{IngestError, LookupError};
pub use histogram::{HistogramStore, CAPACITY};
pub use model::{
    EventRecord, Hello, HubMessage, IngestRequest, OutlierReason, Point, Severity, TraceStep,
};
pub use percentile::PercentileEstimator;
pub use registry::EventRegistry;

/// Sizing knobs for a pipeline instance.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub histogram_capacity: usize,
    pub registry_capacity: usize,
    pub observer_queue: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            histogram_capacity: CAPACITY,
            registry_capacity: registry::DEFAULT_RETENTION,
            observer_queue: broadcast::DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// What one `ingest` call computed.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub percentiles: BTreeMap<String, u8>,
    pub severity: Severity,
    pub outlier_reasons: Vec<OutlierReason>,
    /// `Some` when a point went out to observers.
    pub delivery: Option<Delivery>,
}

pub struct IngestionPipeline {
    registry: EventRegistry,
    estimator: PercentileEstimator,
    classifier: OutlierClassifier,
    hub: BroadcastHub,
    stats: MetricsCollector,
}

impl IngestionPipeline {
    /// Pipeline with default sizing; `started_at_ms` goes into every handshake.
    pub fn new(started_at_ms: i64) -> Self {
        Self::with_options(started_at_ms, PipelineOptions::default())
    }

    pub fn with_options(started_at_ms: i64, opts: PipelineOptions) -> Self {
        let histograms = Arc::new(HistogramStore::with_capacity(opts.histogram_capacity));
        Self {
            registry: EventRegistry::with_capacity(opts.registry_capacity),
            estimator: PercentileEstimator::new(histograms),
            classifier: OutlierClassifier::new(),
            hub: BroadcastHub::with_queue_depth(started_at_ms, opts.observer_queue),
            stats: MetricsCollector::new(),
        }
    }

    /// Run one event through the pipeline.
    ///
    /// With `broadcast == false` histograms and the registry are updated but
    /// no point is published, which is how warm-up seeding stays silent.
    pub fn ingest(
        &self,
        request: IngestRequest,
        broadcast: bool,
    ) -> Result<IngestOutcome, IngestError> {
        let started = Instant::now();

        let record = match validate(request) {
            Ok(record) => record,
            Err(e) => {
                self.stats.record_rejected();
                warn!(error = %e, "rejected ingest payload");
                return Err(e);
            }
        };
        let event_id = record.event_id.clone();

        // Work on a copy; the stored record is only touched via `update_at`.
        let seq = self.registry.put(record.clone());

        let mut percentiles = BTreeMap::new();
        for (key, value) in record.numeric_metrics() {
            percentiles.insert(key.to_owned(), self.estimator.observe(key, value));
        }

        let classification = self.classifier.classify(&record.metrics, &percentiles);
        let outlier = classification.is_outlier();
        let Classification { severity, reasons } = classification;

        // If another ingest of this id landed in between, its results win.
        self.registry.update_at(&event_id, seq, |stored| {
            stored.percentiles = percentiles.clone();
            stored.severity = severity;
            stored.outlier_reasons = reasons.clone();
        });

        let ts = record
            .end_time
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        let name = record.name.clone().unwrap_or_else(|| "event".to_owned());

        let delivery = match record.numeric_metric(model::DURATION_MS) {
            Some(value) if broadcast => {
                let point = Point {
                    event_id: event_id.clone(),
                    name: name.clone(),
                    metric_key: model::DURATION_MS.to_owned(),
                    value,
                    percentile: percentiles
                        .get(model::DURATION_MS)
                        .copied()
                        .unwrap_or(model::NEUTRAL_PERCENTILE),
                    ts,
                    outlier,
                    outlier_reasons: reasons.clone(),
                    severity,
                };
                Some(self.hub.publish(point))
            }
            _ => None,
        };

        debug!(
            event_id = %event_id,
            severity = %severity,
            reasons = reasons.len(),
            broadcast = delivery.is_some(),
            "event ingested"
        );

        self.stats.record(IngestSample {
            event_id,
            name,
            ts,
            severity,
            reasons: reasons.clone(),
            elapsed_us: started.elapsed().as_micros() as u64,
            delivery,
        });

        Ok(IngestOutcome {
            percentiles,
            severity,
            outlier_reasons: reasons,
            delivery,
        })
    }

    /// Stored record including everything computed for it.
    pub fn get(&self, event_id: &str) -> Result<EventRecord, LookupError> {
        self.registry
            .get(event_id)
            .ok_or_else(|| LookupError::NotFound(event_id.to_owned()))
    }

    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    pub fn unsubscribe(&self, id: ObserverId) {
        self.hub.unsubscribe(id);
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    pub fn histograms(&self) -> &HistogramStore {
        self.estimator.histograms()
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(Gauges {
            observers: self.hub.observer_count(),
            registry_size: self.registry.len(),
            registry_evicted: self.registry.evicted(),
            metric_keys: self.histograms().keys(),
        })
    }

    /// Clear histograms, stored events and counters. Observers stay connected.
    pub fn reset(&self) {
        self.histograms().reset();
        self.registry.reset();
        self.stats.reset();
    }
}

/// Turn a raw request into a record, refusing a missing or empty id.
fn validate(request: IngestRequest) -> Result<EventRecord, IngestError> {
    let event_id = match request.event_id {
        Some(id) if !id.is_empty() => id,
        _ => return Err(IngestError::MissingEventId),
    };

    Ok(EventRecord {
        event_id,
        name: request.name,
        service_name: request.service_name,
        start_time: request.start_time,
        end_time: request.end_time,
        metrics: request.metrics,
        percentiles: BTreeMap::new(),
        trace: request.trace,
        tags: request.tags,
        severity: Severity::Normal,
        outlier_reasons: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> IngestRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn missing_event_id_is_rejected_without_side_effects() {
        let p = IngestionPipeline::new(0);
        let mut sub = p.subscribe();
        sub.try_recv();

        let err = p
            .ingest(request(json!({"metrics": {"durationMs": 10}})), true)
            .unwrap_err();
        assert_eq!(err, IngestError::MissingEventId);

        let err = p
            .ingest(request(json!({"eventId": "", "metrics": {"durationMs": 10}})), true)
            .unwrap_err();
        assert_eq!(err, IngestError::MissingEventId);

        assert!(p.registry().is_empty());
        assert!(p.histograms().snapshot("durationMs").is_empty());
        assert!(sub.try_recv().is_none());
        assert_eq!(p.stats().total_rejected, 2);
    }

    #[test]
    fn first_duration_ranks_100_and_is_critical() {
        let p = IngestionPipeline::new(0);
        let out = p
            .ingest(
                request(json!({"eventId": "e1", "metrics": {"durationMs": 5000, "errorCount": 0}})),
                true,
            )
            .unwrap();

        assert_eq!(out.percentiles["durationMs"], 100);
        assert_eq!(out.severity, Severity::Critical);
        assert_eq!(out.outlier_reasons, vec![OutlierReason::LatencyP99]);
        assert!(!out.outlier_reasons.contains(&OutlierReason::ErrorCountCritical));
    }

    #[test]
    fn errors_are_critical_without_duration() {
        let p = IngestionPipeline::new(0);
        let out = p
            .ingest(request(json!({"eventId": "e2", "metrics": {"errorCount": 3}})), true)
            .unwrap();
        assert_eq!(out.severity, Severity::Critical);
        assert!(out.outlier_reasons.contains(&OutlierReason::ErrorCountCritical));
        assert!(out.delivery.is_none());
    }

    #[test]
    fn non_numeric_metrics_are_kept_but_not_ranked() {
        let p = IngestionPipeline::new(0);
        p.ingest(
            request(json!({"eventId": "e3", "metrics": {"durationMs": "fast", "cpuPct": 12}})),
            true,
        )
        .unwrap();

        let stored = p.get("e3").unwrap();
        assert_eq!(stored.metrics["durationMs"], json!("fast"));
        assert!(!stored.percentiles.contains_key("durationMs"));
        assert!(stored.percentiles.contains_key("cpuPct"));
        assert!(p.histograms().snapshot("durationMs").is_empty());
    }

    #[test]
    fn silent_mode_seeds_without_publishing() {
        let p = IngestionPipeline::new(0);
        let mut sub = p.subscribe();
        sub.try_recv();

        let out = p
            .ingest(request(json!({"eventId": "w", "metrics": {"durationMs": 10}})), false)
            .unwrap();
        assert!(out.delivery.is_none());
        assert!(sub.try_recv().is_none());
        assert_eq!(p.histograms().snapshot("durationMs"), vec![10.0]);
    }

    #[test]
    fn unknown_event_is_not_found() {
        let p = IngestionPipeline::new(0);
        assert_eq!(p.get("missing"), Err(LookupError::NotFound("missing".into())));
    }

    #[test]
    fn reset_clears_state() {
        let p = IngestionPipeline::new(0);
        p.ingest(request(json!({"eventId": "a", "metrics": {"durationMs": 1}})), false)
            .unwrap();
        p.reset();
        assert!(p.registry().is_empty());
        assert!(p.histograms().keys().is_empty());
        assert_eq!(p.stats().total_ingested, 0);
    }
}
