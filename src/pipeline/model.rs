use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ─── Well-known metric keys ──────────────────────────────────────

pub const DURATION_MS: &str = "durationMs";
pub const ERROR_COUNT: &str = "errorCount";
pub const CPU_PCT: &str = "cpuPct";
pub const MEM_MB: &str = "memMb";
pub const REQUEST_COUNT: &str = "requestCount";

/// Percentile handed out when a metric has nothing to rank against.
pub const NEUTRAL_PERCENTILE: u8 = 50;

// ─── Severity ────────────────────────────────────────────────────

/// Three-level ordinal; the derived `Ord` follows declaration order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl Severity {
    /// Raise to `other` if it is higher. Never lowers.
    pub fn escalate(&mut self, other: Severity) {
        if other > *self {
            *self = other;
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Outlier reasons ─────────────────────────────────────────────

/// Which metric/threshold pushed an event out of the normal band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierReason {
    LatencyP99,
    LatencyP95,
    ErrorCountCritical,
    CpuP99,
    CpuP95,
    MemP99,
    MemP95,
    ReqP99,
}

// ─── Event records ───────────────────────────────────────────────

/// One named step of an event's trace, e.g. `db.query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub name: String,
    pub value: f64,
}

/// An ingested event plus everything the pipeline computed for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,

    /// Raw metric values exactly as submitted. Non-numeric entries stay here
    /// but never reach a histogram.
    #[serde(default)]
    pub metrics: BTreeMap<String, Value>,

    #[serde(default)]
    pub percentiles: BTreeMap<String, u8>,
    #[serde(default)]
    pub trace: Vec<TraceStep>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub outlier_reasons: Vec<OutlierReason>,
}

impl EventRecord {
    /// Bare record with only an id; handy for callers building events in code.
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            name: None,
            service_name: None,
            start_time: None,
            end_time: None,
            metrics: BTreeMap::new(),
            percentiles: BTreeMap::new(),
            trace: Vec::new(),
            tags: BTreeMap::new(),
            severity: Severity::Normal,
            outlier_reasons: Vec::new(),
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The metric's value if it is a well-formed (finite) number.
    pub fn numeric_metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).and_then(numeric_value)
    }

    /// Every well-formed numeric metric, in key order.
    pub fn numeric_metrics(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.metrics
            .iter()
            .filter_map(|(key, value)| numeric_value(value).map(|v| (key.as_str(), v)))
    }
}

/// `Some(v)` for JSON numbers with a finite `f64` form, `None` otherwise.
pub fn numeric_value(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

/// Body of an ingestion call before validation.
///
/// Identical to [`EventRecord`] except `eventId` may be absent, so a missing
/// id surfaces as a pipeline validation error rather than a parse failure.
/// Client-supplied `percentiles`, `severity` and `outlierReasons` are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub start_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub metrics: BTreeMap<String, Value>,
    #[serde(default)]
    pub trace: Vec<TraceStep>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Epoch millis sent as any finite JSON number; fractions are truncated.
/// Strings, booleans and nulls read as absent rather than failing the payload.
fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))))
}

impl From<EventRecord> for IngestRequest {
    fn from(record: EventRecord) -> Self {
        Self {
            event_id: Some(record.event_id),
            name: record.name,
            service_name: record.service_name,
            start_time: record.start_time,
            end_time: record.end_time,
            metrics: record.metrics,
            trace: record.trace,
            tags: record.tags,
        }
    }
}

// ─── Wire messages ───────────────────────────────────────────────

/// Compact live-feed payload derived from an ingested event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    pub event_id: String,
    pub name: String,
    pub metric_key: String,
    pub value: f64,
    pub percentile: u8,
    pub ts: i64,
    pub outlier: bool,
    pub outlier_reasons: Vec<OutlierReason>,
    pub severity: Severity,
}

/// Handshake sent once to every new observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    pub status: String,
    pub server_start: i64,
}

/// Everything an observer can receive, tagged as `{"type": .., "data": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum HubMessage {
    Hello(Hello),
    Point(Point),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn severity_only_escalates() {
        let mut s = Severity::Normal;
        s.escalate(Severity::Critical);
        s.escalate(Severity::Warning);
        assert_eq!(s, Severity::Critical);
        assert!(Severity::Normal < Severity::Warning && Severity::Warning < Severity::Critical);
    }

    #[test]
    fn numeric_filter_skips_strings_and_null() {
        let record = EventRecord::new("e")
            .with_metric("durationMs", 12.5)
            .with_metric("region", "eu-west")
            .with_metric("missing", Value::Null);

        let numeric: Vec<_> = record.numeric_metrics().collect();
        assert_eq!(numeric, vec![("durationMs", 12.5)]);
        assert_eq!(record.metrics.len(), 3);
    }

    #[test]
    fn record_serializes_with_wire_names() {
        let mut record = EventRecord::new("e1").with_metric("durationMs", 10);
        record.outlier_reasons.push(OutlierReason::ErrorCountCritical);
        record.severity = Severity::Critical;

        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v["eventId"], "e1");
        assert_eq!(v["severity"], "critical");
        assert_eq!(v["outlierReasons"], json!(["error_count_critical"]));
        assert!(v.get("name").is_none());
    }

    #[test]
    fn hub_messages_are_type_tagged() {
        let hello = HubMessage::Hello(Hello {
            status: "connected".into(),
            server_start: 42,
        });
        let v = serde_json::to_value(&hello).unwrap();
        assert_eq!(v, json!({"type": "hello", "data": {"status": "connected", "serverStart": 42}}));
    }

    #[test]
    fn ingest_request_tolerates_missing_id() {
        let req: IngestRequest = serde_json::from_value(json!({"metrics": {"cpuPct": 3}})).unwrap();
        assert!(req.event_id.is_none());
        assert_eq!(req.metrics["cpuPct"], json!(3));
    }

    #[test]
    fn timestamps_accept_fractional_millis() {
        let req: IngestRequest = serde_json::from_value(json!({
            "eventId": "e",
            "startTime": 1_700_000_000_000i64,
            "endTime": 1_700_000_000_123.7,
        }))
        .unwrap();
        assert_eq!(req.start_time, Some(1_700_000_000_000));
        assert_eq!(req.end_time, Some(1_700_000_000_123));
    }

    #[test]
    fn non_numeric_timestamps_read_as_absent() {
        let req: IngestRequest =
            serde_json::from_value(json!({"eventId": "e", "endTime": "soon", "startTime": null}))
                .unwrap();
        assert_eq!(req.end_time, None);
        assert_eq!(req.start_time, None);
    }
}
