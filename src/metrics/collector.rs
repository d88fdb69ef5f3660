use std::collections::VecDeque;
use std::time::Instant;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use crate::pipeline::{Delivery, OutlierReason, Severity};

// ─── Configuration ───────────────────────────────────────────────

/// How many outlier events we keep for the live feed
const MAX_RECENT_OUTLIERS: usize = 200;

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe self-observability for the ingestion pipeline.
/// The pipeline calls `record()` per ingest, the stats endpoints call `snapshot()`.
pub struct MetricsCollector {
    inner: Mutex<Inner>,
}

/// One finished `ingest` call, as seen by the collector.
#[derive(Debug, Clone)]
pub struct IngestSample {
    pub event_id: String,
    pub name: String,
    pub ts: i64,
    pub severity: Severity,
    pub reasons: Vec<OutlierReason>,
    /// Wall time spent inside `ingest` (μs)
    pub elapsed_us: u64,
    /// `Some` when a point was published
    pub delivery: Option<Delivery>,
}

/// A single entry in the recent-outliers feed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlierRecord {
    pub event_id: String,
    pub name: String,
    pub ts: i64,
    pub severity: Severity,
    pub outlier_reasons: Vec<OutlierReason>,
}

/// Counts per severity level.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SeverityCounts {
    pub normal: u64,
    pub warning: u64,
    pub critical: u64,
}

/// Ingest wall time quantiles (μs); all zero until something is ingested.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LatencySummary {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub p999: u64,
}

/// Point-in-time values owned by other components, passed in at snapshot time.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gauges {
    pub observers: usize,
    pub registry_size: usize,
    pub registry_evicted: u64,
    pub metric_keys: Vec<String>,
}

/// Complete snapshot shipped on every stats request or SSE tick.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub ingest_latency_us: LatencySummary,

    // Counters
    pub total_ingested: u64,
    pub total_rejected: u64,
    pub severity: SeverityCounts,
    pub points_published: u64,
    pub deliveries: u64,
    pub observers_pruned: u64,
    pub events_per_sec: f64,
    pub elapsed_secs: f64,

    #[serde(flatten)]
    pub gauges: Gauges,

    pub recent_outliers: Vec<OutlierRecord>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    ingest_hist: Histogram<u64>,

    total_ingested: u64,
    total_rejected: u64,
    severity: SeverityCounts,
    points_published: u64,
    deliveries: u64,
    observers_pruned: u64,

    recent_outliers: VecDeque<OutlierRecord>,

    // Wall-clock anchor for elapsed time
    start_time: Option<Instant>,
}

// ─── MetricsCollector impl ───────────────────────────────────────

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Record one accepted ingestion.
    pub fn record(&self, sample: IngestSample) {
        self.inner.lock().record(sample);
    }

    /// Count an ingestion that failed validation.
    pub fn record_rejected(&self) {
        let mut inner = self.inner.lock();
        inner.start_time.get_or_insert_with(Instant::now);
        inner.total_rejected += 1;
    }

    /// Wipe all counters.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::new();
    }

    /// Produce a read-only snapshot for the stats endpoints.
    pub fn snapshot(&self, gauges: Gauges) -> StatsSnapshot {
        self.inner.lock().snapshot(gauges)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new() -> Self {
        Self {
            ingest_hist: Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                .expect("histogram creation"),
            total_ingested: 0,
            total_rejected: 0,
            severity: SeverityCounts::default(),
            points_published: 0,
            deliveries: 0,
            observers_pruned: 0,
            recent_outliers: VecDeque::with_capacity(MAX_RECENT_OUTLIERS + 1),
            start_time: None,
        }
    }

    fn record(&mut self, sample: IngestSample) {
        // Lazily set the anchor on the very first sample
        self.start_time.get_or_insert_with(Instant::now);

        // ── Counters ────────────────────────────────────────────
        self.total_ingested += 1;
        match sample.severity {
            Severity::Normal => self.severity.normal += 1,
            Severity::Warning => self.severity.warning += 1,
            Severity::Critical => self.severity.critical += 1,
        }
        if let Some(delivery) = sample.delivery {
            self.points_published += 1;
            self.deliveries += delivery.delivered as u64;
            self.observers_pruned += delivery.pruned as u64;
        }

        // ── Latency (clamped into the histogram's range) ────────
        let _ = self
            .ingest_hist
            .record(sample.elapsed_us.clamp(HIST_LOW, HIST_HIGH));

        // ── Outlier feed ────────────────────────────────────────
        if !sample.reasons.is_empty() {
            self.recent_outliers.push_back(OutlierRecord {
                event_id: sample.event_id,
                name: sample.name,
                ts: sample.ts,
                severity: sample.severity,
                outlier_reasons: sample.reasons,
            });
            if self.recent_outliers.len() > MAX_RECENT_OUTLIERS {
                self.recent_outliers.pop_front();
            }
        }
    }

    fn latency_summary(&self) -> LatencySummary {
        let hist = &self.ingest_hist;
        if hist.len() == 0 {
            return LatencySummary::default();
        }
        LatencySummary {
            count: hist.len(),
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_quantile(0.50),
            p95: hist.value_at_quantile(0.95),
            p99: hist.value_at_quantile(0.99),
            p999: hist.value_at_quantile(0.999),
        }
    }

    fn snapshot(&self, gauges: Gauges) -> StatsSnapshot {
        let elapsed_secs = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let events_per_sec = if elapsed_secs > 0.0 {
            self.total_ingested as f64 / elapsed_secs
        } else {
            0.0
        };

        StatsSnapshot {
            ingest_latency_us: self.latency_summary(),
            total_ingested: self.total_ingested,
            total_rejected: self.total_rejected,
            severity: self.severity,
            points_published: self.points_published,
            deliveries: self.deliveries,
            observers_pruned: self.observers_pruned,
            events_per_sec,
            elapsed_secs,
            gauges,
            recent_outliers: self.recent_outliers.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, severity: Severity, reasons: Vec<OutlierReason>) -> IngestSample {
        IngestSample {
            event_id: id.into(),
            name: "event".into(),
            ts: 0,
            severity,
            reasons,
            elapsed_us: 25,
            delivery: None,
        }
    }

    #[test]
    fn counts_by_severity() {
        let c = MetricsCollector::new();
        c.record(sample("a", Severity::Normal, vec![]));
        c.record(sample("b", Severity::Critical, vec![OutlierReason::ErrorCountCritical]));
        c.record_rejected();

        let snap = c.snapshot(Gauges::default());
        assert_eq!(snap.total_ingested, 2);
        assert_eq!(snap.total_rejected, 1);
        assert_eq!(snap.severity.critical, 1);
        assert_eq!(snap.severity.normal, 1);
        assert_eq!(snap.ingest_latency_us.count, 2);
        assert_eq!(snap.recent_outliers.len(), 1);
        assert_eq!(snap.recent_outliers[0].event_id, "b");
    }

    #[test]
    fn delivery_totals_accumulate() {
        let c = MetricsCollector::new();
        let mut s = sample("a", Severity::Normal, vec![]);
        s.delivery = Some(Delivery { delivered: 3, pruned: 1 });
        c.record(s);

        let snap = c.snapshot(Gauges::default());
        assert_eq!(snap.points_published, 1);
        assert_eq!(snap.deliveries, 3);
        assert_eq!(snap.observers_pruned, 1);
    }

    #[test]
    fn outlier_feed_is_bounded() {
        let c = MetricsCollector::new();
        for i in 0..(MAX_RECENT_OUTLIERS + 10) {
            c.record(sample(&format!("e{i}"), Severity::Warning, vec![OutlierReason::ReqP99]));
        }
        let snap = c.snapshot(Gauges::default());
        assert_eq!(snap.recent_outliers.len(), MAX_RECENT_OUTLIERS);
        assert_eq!(snap.recent_outliers[0].event_id, "e10");
    }

    #[test]
    fn latency_summary_tracks_recorded_times() {
        let c = MetricsCollector::new();
        assert_eq!(c.snapshot(Gauges::default()).ingest_latency_us.count, 0);

        for us in 1..=100u64 {
            let mut s = sample("e", Severity::Normal, vec![]);
            s.elapsed_us = us;
            c.record(s);
        }
        let lat = c.snapshot(Gauges::default()).ingest_latency_us;
        assert_eq!(lat.count, 100);
        assert_eq!((lat.min, lat.max), (1, 100));
        assert_eq!(lat.p50, 50);
        assert_eq!(lat.p99, 99);
    }

    #[test]
    fn zero_elapsed_is_clamped_into_range() {
        let c = MetricsCollector::new();
        let mut s = sample("e", Severity::Normal, vec![]);
        s.elapsed_us = 0;
        c.record(s);
        assert_eq!(c.snapshot(Gauges::default()).ingest_latency_us.min, 1);
    }

    #[test]
    fn reset_clears_everything() {
        let c = MetricsCollector::new();
        c.record(sample("a", Severity::Normal, vec![]));
        c.reset();
        assert_eq!(c.snapshot(Gauges::default()).total_ingested, 0);
    }
}
