use std::collections::BTreeMap;

use serde_json::Value;

use super::model::{
    numeric_value, OutlierReason, Severity, CPU_PCT, DURATION_MS, ERROR_COUNT, MEM_MB,
    REQUEST_COUNT,
};

/// What a rule looks at on its metric.
#[derive(Debug, Clone, Copy)]
enum Trigger {
    /// Percentile in `[at, below)`; `below: None` means no upper bound.
    Percentile { at: u8, below: Option<u8> },
    /// Raw metric value `>= at`.
    Value { at: f64 },
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    metric: &'static str,
    trigger: Trigger,
    reason: OutlierReason,
    severity: Severity,
}

const fn pct(
    metric: &'static str,
    at: u8,
    below: Option<u8>,
    reason: OutlierReason,
    severity: Severity,
) -> Rule {
    Rule {
        metric,
        trigger: Trigger::Percentile { at, below },
        reason,
        severity,
    }
}

/// Evaluated top to bottom; reasons come out in this order.
const RULES: &[Rule] = &[
    pct(DURATION_MS, 99, None, OutlierReason::LatencyP99, Severity::Critical),
    pct(DURATION_MS, 95, Some(99), OutlierReason::LatencyP95, Severity::Warning),
    Rule {
        metric: ERROR_COUNT,
        trigger: Trigger::Value { at: 1.0 },
        reason: OutlierReason::ErrorCountCritical,
        severity: Severity::Critical,
    },
    pct(CPU_PCT, 99, None, OutlierReason::CpuP99, Severity::Critical),
    pct(CPU_PCT, 95, Some(99), OutlierReason::CpuP95, Severity::Warning),
    pct(MEM_MB, 99, None, OutlierReason::MemP99, Severity::Critical),
    pct(MEM_MB, 95, Some(99), OutlierReason::MemP95, Severity::Warning),
    pct(REQUEST_COUNT, 99, None, OutlierReason::ReqP99, Severity::Warning),
];

/// Result of classifying one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub severity: Severity,
    pub reasons: Vec<OutlierReason>,
}

impl Classification {
    pub fn is_outlier(&self) -> bool {
        !self.reasons.is_empty()
    }
}

/// Fixed threshold table mapping metric percentiles to a severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlierClassifier;

impl OutlierClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Every rule whose metric is present and numeric gets evaluated; all
    /// matching rules contribute a reason. Severity starts at `normal` and
    /// only ever escalates.
    pub fn classify(
        &self,
        metrics: &BTreeMap<String, Value>,
        percentiles: &BTreeMap<String, u8>,
    ) -> Classification {
        let mut out = Classification::default();

        for rule in RULES {
            let Some(value) = metrics.get(rule.metric).and_then(numeric_value) else {
                continue;
            };

            let fired = match rule.trigger {
                Trigger::Value { at } => value >= at,
                Trigger::Percentile { at, below } => match percentiles.get(rule.metric) {
                    Some(&p) => p >= at && below.map_or(true, |b| p < b),
                    None => false,
                },
            };

            if fired {
                out.reasons.push(rule.reason);
                out.severity.escalate(rule.severity);
            }
        }

        out
    }
}
