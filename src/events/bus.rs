//! # Broadcast bus for adjustment records.
//!
//! [`AdjustmentBus`] wraps [`tokio::sync::broadcast`] so the controller can
//! fan one [`Adjustment`] out to any number of independent subscribers.
//!
//! ## Key characteristics
//! - **Broadcast semantics**: every active subscriber receives a copy.
//! - **Non-persistent**: records published with no subscribers are dropped
//!   silently; the core operates fine unobserved.
//! - **Bounded capacity**: slow subscribers lag and skip old records rather
//!   than blocking the publisher.

use tokio::sync::broadcast;

use super::event::Adjustment;

/// Broadcast channel for [`Adjustment`] records.
#[derive(Clone)]
pub struct AdjustmentBus {
    tx: broadcast::Sender<Adjustment>,
}

impl AdjustmentBus {
    /// Creates a bus with the given ring-buffer capacity (clamped to >= 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes a record to all current subscribers (non-blocking).
    ///
    /// With no active subscribers the record is dropped silently.
    pub fn publish(&self, adjustment: Adjustment) {
        let _ = self.tx.send(adjustment);
    }

    /// Creates a receiver that observes all records published after this
    /// call. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<Adjustment> {
        self.tx.subscribe()
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn subscribers_each_receive_published_records() {
        let bus = AdjustmentBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(Adjustment::now(7, Duration::from_millis(10), 0.0, 5));

        assert_eq!(a.recv().await.unwrap().new_limit, 7);
        assert_eq!(b.recv().await.unwrap().new_limit, 7);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let bus = AdjustmentBus::new(4);
        bus.publish(Adjustment::now(3, Duration::ZERO, 0.0, 0));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn seq_orders_records_across_receivers() {
        let bus = AdjustmentBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(Adjustment::now(2, Duration::ZERO, 0.0, 1));
        bus.publish(Adjustment::now(3, Duration::ZERO, 0.0, 1));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(first.seq < second.seq);
    }
}
