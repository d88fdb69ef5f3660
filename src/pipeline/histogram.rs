use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Default number of observations kept per metric key.
pub const CAPACITY: usize = 500;

/// Per-key sliding windows of recent observations.
///
/// Each key owns its own lock, so writers on `durationMs` never wait on
/// writers on `cpuPct`. The outer map lock is only held long enough to find
/// or create a window.
pub struct HistogramStore {
    capacity: usize,
    windows: RwLock<HashMap<String, Arc<Mutex<Window>>>>,
}

/// Arrival-ordered values for one metric key; oldest at the front.
#[derive(Debug, Clone, Default)]
pub struct Window {
    values: VecDeque<f64>,
}

impl Window {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Append and evict from the front once past `capacity` (FIFO).
    fn push(&mut self, value: f64, capacity: usize) {
        self.values.push_back(value);
        while self.values.len() > capacity {
            self.values.pop_front();
        }
    }
}

impl HistogramStore {
    pub fn new() -> Self {
        Self::with_capacity(CAPACITY)
    }

    /// A zero capacity is bumped to one so ranking always has a window.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Append `value` to the window for `key`, creating it on first use.
    pub fn record(&self, key: &str, value: f64) {
        self.record_with(key, value, |_| ());
    }

    /// Append `value`, then run `f` on the updated window while its lock is
    /// still held. Record-then-rank is one atomic step per key.
    pub fn record_with<R>(&self, key: &str, value: f64, f: impl FnOnce(&Window) -> R) -> R {
        let window = self.window(key);
        let mut guard = window.lock();
        guard.push(value, self.capacity);
        f(&*guard)
    }

    /// Run `f` on the current window for `key` without modifying it.
    /// Unknown keys see an empty window.
    pub fn inspect<R>(&self, key: &str, f: impl FnOnce(&Window) -> R) -> R {
        let existing = self.windows.read().get(key).cloned();
        match existing {
            Some(window) => f(&*window.lock()),
            None => f(&Window::default()),
        }
    }

    /// Copy of the window's contents, oldest first.
    pub fn snapshot(&self, key: &str) -> Vec<f64> {
        self.inspect(key, |w| w.iter().collect())
    }

    /// Metric keys that have received at least one observation.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.windows.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop every window.
    pub fn reset(&self) {
        self.windows.write().clear();
    }

    fn window(&self, key: &str) -> Arc<Mutex<Window>> {
        if let Some(window) = self.windows.read().get(key) {
            return window.clone();
        }
        self.windows
            .write()
            .entry(key.to_owned())
            .or_default()
            .clone()
    }
}

impl Default for HistogramStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unknown_key_is_empty() {
        let store = HistogramStore::new();
        assert!(store.snapshot("durationMs").is_empty());
        assert!(store.keys().is_empty());
    }

    #[test]
    fn evicts_oldest_first() {
        let store = HistogramStore::with_capacity(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            store.record("k", v);
        }
        assert_eq!(store.snapshot("k"), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn keys_are_independent() {
        let store = HistogramStore::with_capacity(2);
        store.record("a", 1.0);
        store.record("b", 10.0);
        store.record("a", 2.0);
        store.record("a", 3.0);
        assert_eq!(store.snapshot("a"), vec![2.0, 3.0]);
        assert_eq!(store.snapshot("b"), vec![10.0]);
        assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn record_with_sees_the_new_value() {
        let store = HistogramStore::new();
        let len = store.record_with("k", 7.0, |w| w.len());
        assert_eq!(len, 1);
    }

    #[test]
    fn reset_clears_windows() {
        let store = HistogramStore::new();
        store.record("k", 1.0);
        store.reset();
        assert!(store.snapshot("k").is_empty());
    }

    proptest! {
        /// After any sequence of inserts the window holds the last
        /// `capacity` values in arrival order.
        #[test]
        fn window_keeps_most_recent_values(
            values in proptest::collection::vec(-1.0e6f64..1.0e6, 0..1200),
            capacity in 1usize..600,
        ) {
            let store = HistogramStore::with_capacity(capacity);
            for v in &values {
                store.record("k", *v);
            }
            let start = values.len().saturating_sub(capacity);
            prop_assert_eq!(store.snapshot("k"), values[start..].to_vec());
        }
    }
}
