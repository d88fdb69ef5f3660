use std::sync::Arc;

use super::histogram::{HistogramStore, Window};
use super::model::NEUTRAL_PERCENTILE;

/// Percentile rank of `value` within `window`: the share of stored values
/// that are `<= value`, rounded to a whole percent.
///
/// An empty window ranks everything at [`NEUTRAL_PERCENTILE`].
pub fn rank_in(window: &Window, value: f64) -> u8 {
    if window.is_empty() {
        return NEUTRAL_PERCENTILE;
    }

    let mut sorted: Vec<f64> = window.iter().collect();
    sorted.sort_by(f64::total_cmp);
    let at_or_below = sorted.partition_point(|v| *v <= value);

    let pct = (100.0 * at_or_below as f64 / sorted.len() as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Ranks metric values against the recent history in a [`HistogramStore`].
#[derive(Clone)]
pub struct PercentileEstimator {
    histograms: Arc<HistogramStore>,
}

impl PercentileEstimator {
    pub fn new(histograms: Arc<HistogramStore>) -> Self {
        Self { histograms }
    }

    /// Rank `value` against the window for `key` as it stands, without
    /// recording anything.
    pub fn rank(&self, key: &str, value: f64) -> u8 {
        self.histograms.inspect(key, |w| rank_in(w, value))
    }

    /// Record `value` under `key` and rank it against the window that now
    /// includes it. Both steps happen under the key's lock.
    pub fn observe(&self, key: &str, value: f64) -> u8 {
        self.histograms.record_with(key, value, |w| rank_in(w, value))
    }

    pub fn histograms(&self) -> &Arc<HistogramStore> {
        &self.histograms
    }
}
