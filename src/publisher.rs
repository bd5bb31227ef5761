// src/publisher.rs
//! Latest-value fan-out of GNSS snapshots
//!
//! Built on [`tokio::sync::watch`]: publishing never waits on a subscriber,
//! and a subscriber that falls behind skips straight to the newest snapshot.

use crate::gps::data::GnssState;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::watch;
use tracing::trace;

/// Holds the current snapshot and notifies subscribers when it is replaced.
#[derive(Debug)]
pub struct Publisher {
    sender: watch::Sender<Arc<GnssState>>,
    sequence: Arc<AtomicU64>,
}

impl Publisher {
    /// Start out with the default "no fix / all unknown" snapshot.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Arc::new(GnssState::new()));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to snapshot replacements.
    ///
    /// The first `changed()` resolves on the next publication after this call.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Replace the current snapshot wholesale. Returns its sequence number.
    pub fn publish(&self, state: GnssState) -> u64 {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.sender.send_replace(Arc::new(state));
        trace!(sequence = seq, receivers = self.sender.receiver_count(), "snapshot published");
        seq
    }

    pub fn latest(&self) -> Arc<GnssState> {
        Arc::clone(&self.sender.borrow())
    }

    /// Returns the number of snapshots published so far.
    pub fn published_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}

/// A read-only view of the published snapshots.
#[derive(Debug, Clone)]
pub struct Subscription {
    receiver: watch::Receiver<Arc<GnssState>>,
}

impl Subscription {
    /// Wait for the next snapshot. Returns `None` once the publisher is gone
    /// and the final snapshot has been seen.
    pub async fn changed(&mut self) -> Option<Arc<GnssState>> {
        self.receiver.changed().await.ok()?;
        Some(Arc::clone(&self.receiver.borrow_and_update()))
    }

    /// The newest snapshot, without waiting.
    pub fn latest(&self) -> Arc<GnssState> {
        Arc::clone(&self.receiver.borrow())
    }

    /// True when a snapshot newer than the last one returned by `changed` exists.
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::data::FixQuality;

    fn state_with_altitude(alt: f64) -> GnssState {
        GnssState {
            altitude_meters: Some(alt),
            ..GnssState::default()
        }
    }

    #[tokio::test]
    async fn test_subscribers_are_independent() {
        let publisher = Publisher::new();
        let mut fast = publisher.subscribe();
        let slow = publisher.subscribe();

        publisher.publish(state_with_altitude(1.0));
        let seen = fast.changed().await.unwrap();
        assert_eq!(seen.altitude_meters, Some(1.0));

        // The slow subscriber never polled; publishing still went through.
        assert!(slow.has_changed());
        assert_eq!(publisher.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_slow_subscriber_gets_latest_snapshot() {
        let publisher = Publisher::new();
        let mut slow = publisher.subscribe();

        for alt in 1..=100 {
            publisher.publish(state_with_altitude(alt as f64));
        }

        let seen = slow.changed().await.unwrap();
        assert_eq!(seen.altitude_meters, Some(100.0));
        assert!(!slow.has_changed());
        assert_eq!(publisher.published_count(), 100);
    }

    #[tokio::test]
    async fn test_final_snapshot_seen_before_close() {
        let publisher = Publisher::new();
        let mut sub = publisher.subscribe();

        let mut last = GnssState::default();
        last.fix_quality = FixQuality::Gps;
        publisher.publish(last);
        drop(publisher);

        let seen = sub.changed().await.expect("final snapshot delivered");
        assert_eq!(seen.fix_quality, FixQuality::Gps);
        assert!(sub.changed().await.is_none());
        assert_eq!(sub.latest().fix_quality, FixQuality::Gps);
    }

    #[test]
    fn test_initial_snapshot_is_default() {
        let publisher = Publisher::new();
        assert_eq!(*publisher.latest(), GnssState::default());
        assert_eq!(*publisher.subscribe().latest(), GnssState::default());
    }
}
