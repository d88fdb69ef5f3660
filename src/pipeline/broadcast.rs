use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::model::{Hello, HubMessage, Point};

/// Outbound messages buffered per observer before it counts as failed.
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

pub type ObserverId = u64;

/// Set of live observers plus fan-out.
///
/// Each observer owns a bounded queue; `publish` only ever `try_send`s into
/// it, so a stalled observer costs the publisher nothing. A full or closed
/// queue gets the observer pruned, which in turn closes its receiver.
pub struct BroadcastHub {
    started_at_ms: i64,
    queue_depth: usize,
    next_id: AtomicU64,
    observers: Mutex<HashMap<ObserverId, mpsc::Sender<Arc<HubMessage>>>>,
}

/// Receiving half handed to a newly subscribed observer.
pub struct Subscription {
    id: ObserverId,
    rx: mpsc::Receiver<Arc<HubMessage>>,
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Next message, or `None` once the hub has dropped this observer.
    pub async fn recv(&mut self) -> Option<Arc<HubMessage>> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Arc<HubMessage>> {
        self.rx.try_recv().ok()
    }
}

/// Outcome of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub pruned: usize,
}

impl BroadcastHub {
    pub fn new(started_at_ms: i64) -> Self {
        Self::with_queue_depth(started_at_ms, DEFAULT_QUEUE_DEPTH)
    }

    pub fn with_queue_depth(started_at_ms: i64, queue_depth: usize) -> Self {
        Self {
            started_at_ms,
            queue_depth: queue_depth.max(1),
            next_id: AtomicU64::new(1),
            observers: Mutex::new(HashMap::new()),
        }
    }

    /// Register an observer. Its queue already holds the handshake.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_depth);

        let hello = HubMessage::Hello(Hello {
            status: "connected".into(),
            server_start: self.started_at_ms,
        });
        // Fresh channel with capacity >= 1; cannot be full.
        let _ = tx.try_send(Arc::new(hello));

        self.observers.lock().insert(id, tx);
        debug!(observer = id, "observer subscribed");

        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: ObserverId) {
        if self.observers.lock().remove(&id).is_some() {
            debug!(observer = id, "observer unsubscribed");
        }
    }

    /// Best-effort delivery of `point` to every current observer.
    ///
    /// Iterates over a snapshot of the set taken under the lock, so concurrent
    /// subscribe/unsubscribe calls never wait on delivery.
    pub fn publish(&self, point: Point) -> Delivery {
        let targets: Vec<(ObserverId, mpsc::Sender<Arc<HubMessage>>)> = self
            .observers
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        if targets.is_empty() {
            return Delivery::default();
        }

        let message = Arc::new(HubMessage::Point(point));
        let mut delivery = Delivery::default();
        let mut failed = Vec::new();

        for (id, tx) in targets {
            match tx.try_send(message.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(_) => failed.push(id),
            }
        }

        if !failed.is_empty() {
            let mut observers = self.observers.lock();
            for id in &failed {
                if observers.remove(id).is_some() {
                    delivery.pruned += 1;
                }
            }
            debug!(pruned = delivery.pruned, "dropped unreachable observers");
        }

        delivery
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::model::Severity;

    fn point(id: &str) -> Point {
        Point {
            event_id: id.into(),
            name: "event".into(),
            metric_key: "durationMs".into(),
            value: 10.0,
            percentile: 50,
            ts: 0,
            outlier: false,
            outlier_reasons: Vec::new(),
            severity: Severity::Normal,
        }
    }

    fn expect_point(msg: Option<Arc<HubMessage>>) -> Point {
        match msg.as_deref() {
            Some(HubMessage::Point(p)) => p.clone(),
            other => panic!("expected point, got {other:?}"),
        }
    }

    #[test]
    fn subscribe_delivers_handshake_first() {
        let hub = BroadcastHub::new(1_700_000_000_000);
        let mut sub = hub.subscribe();
        match sub.try_recv().as_deref() {
            Some(HubMessage::Hello(h)) => {
                assert_eq!(h.server_start, 1_700_000_000_000);
                assert_eq!(h.status, "connected");
            }
            other => panic!("expected hello, got {other:?}"),
        }
        assert_eq!(hub.observer_count(), 1);
    }

    #[test]
    fn publish_with_no_observers_is_fine() {
        let hub = BroadcastHub::new(0);
        assert_eq!(hub.publish(point("e1")), Delivery::default());
    }

    #[test]
    fn each_observer_sees_points_in_publish_order() {
        let hub = BroadcastHub::new(0);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        a.try_recv();
        b.try_recv();

        for id in ["e1", "e2", "e3"] {
            assert_eq!(hub.publish(point(id)).delivered, 2);
        }
        for sub in [&mut a, &mut b] {
            let ids: Vec<_> = (0..3).map(|_| expect_point(sub.try_recv()).event_id).collect();
            assert_eq!(ids, vec!["e1", "e2", "e3"]);
        }
    }

    #[test]
    fn closed_observer_is_pruned() {
        let hub = BroadcastHub::new(0);
        let dead = hub.subscribe();
        let mut live = hub.subscribe();
        drop(dead);

        let d = hub.publish(point("e1"));
        assert_eq!(d, Delivery { delivered: 1, pruned: 1 });
        assert_eq!(hub.observer_count(), 1);

        live.try_recv();
        assert_eq!(expect_point(live.try_recv()).event_id, "e1");
    }

    #[test]
    fn full_queue_drops_the_slow_observer() {
        let hub = BroadcastHub::with_queue_depth(0, 2);
        let mut slow = hub.subscribe();
        // handshake occupies one slot
        assert_eq!(hub.publish(point("e1")).delivered, 1);
        let d = hub.publish(point("e2"));
        assert_eq!(d, Delivery { delivered: 0, pruned: 1 });
        assert_eq!(hub.observer_count(), 0);

        // buffered messages drain, then the queue reports closed
        assert!(slow.try_recv().is_some());
        assert_eq!(expect_point(slow.try_recv()).event_id, "e1");
        assert!(slow.try_recv().is_none());
    }

    #[test]
    fn unsubscribe_removes_observer() {
        let hub = BroadcastHub::new(0);
        let sub = hub.subscribe();
        hub.unsubscribe(sub.id());
        assert_eq!(hub.observer_count(), 0);
        assert_eq!(hub.publish(point("e1")).delivered, 0);
    }

    #[tokio::test]
    async fn recv_ends_after_prune() {
        let hub = BroadcastHub::with_queue_depth(0, 1);
        let mut sub = hub.subscribe();
        // queue holds only the handshake, so the next publish prunes
        hub.publish(point("e1"));
        assert!(matches!(sub.recv().await.as_deref(), Some(HubMessage::Hello(_))));
        assert!(sub.recv().await.is_none());
    }
}
