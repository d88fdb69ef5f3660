use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;

use super::model::EventRecord;

/// Default upper bound on retained records.
pub const DEFAULT_RETENTION: usize = 100_000;

/// Keyed store of ingested events.
///
/// Retention is bounded: once more than `capacity` distinct ids are held, the
/// id whose latest `put` is oldest is evicted. A capacity of zero disables
/// eviction.
pub struct EventRegistry {
    capacity: usize,
    inner: RwLock<Inner>,
}

struct Slot {
    record: EventRecord,
    /// Sequence number of the `put` that wrote this slot.
    seq: u64,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, Slot>,
    /// Insertion log; entries whose `seq` no longer matches the slot are stale.
    order: VecDeque<(String, u64)>,
    next_seq: u64,
    evicted: u64,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RETENTION)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Store `record`, replacing any earlier record with the same id.
    /// Returns the write's sequence number for use with [`update_at`](Self::update_at).
    pub fn put(&self, record: EventRecord) -> u64 {
        let mut inner = self.inner.write();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let id = record.event_id.clone();
        inner.order.push_back((id.clone(), seq));
        inner.records.insert(id, Slot { record, seq });

        if self.capacity > 0 {
            inner.enforce(self.capacity);
        }
        seq
    }

    /// Copy of the stored record.
    pub fn get(&self, event_id: &str) -> Option<EventRecord> {
        self.inner
            .read()
            .records
            .get(event_id)
            .map(|slot| slot.record.clone())
    }

    /// Apply `mutate` to the stored record under the write lock, so readers
    /// see either none or all of the change. Returns `None` for unknown ids.
    pub fn update<R>(&self, event_id: &str, mutate: impl FnOnce(&mut EventRecord) -> R) -> Option<R> {
        let mut inner = self.inner.write();
        inner
            .records
            .get_mut(event_id)
            .map(|slot| mutate(&mut slot.record))
    }

    /// Like [`update`](Self::update), but only if the stored record is still
    /// the one written by `put` number `seq`. A later `put` of the same id
    /// turns this into a no-op and `None` is returned.
    pub fn update_at<R>(
        &self,
        event_id: &str,
        seq: u64,
        mutate: impl FnOnce(&mut EventRecord) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.write();
        inner
            .records
            .get_mut(event_id)
            .filter(|slot| slot.seq == seq)
            .map(|slot| mutate(&mut slot.record))
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records dropped by the retention bound since startup.
    pub fn evicted(&self) -> u64 {
        self.inner.read().evicted
    }

    pub fn reset(&self) {
        *self.inner.write() = Inner::default();
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn enforce(&mut self, capacity: usize) {
        while self.records.len() > capacity {
            let Some((id, seq)) = self.order.pop_front() else {
                break;
            };
            if self.records.get(&id).is_some_and(|slot| slot.seq == seq) {
                self.records.remove(&id);
                self.evicted += 1;
            }
        }

        // Overwrites leave stale log entries behind; drop them once they
        // outnumber live records.
        if self.order.len() > capacity.saturating_mul(2) {
            let records = &self.records;
            self.order
                .retain(|(id, seq)| records.get(id).is_some_and(|slot| slot.seq == *seq));
        }
    }
}
