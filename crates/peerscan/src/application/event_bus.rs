//! DiscoveryEventBus: carries raw hardware callback events to the coordinator.
//!
//! Hardware callbacks run on threads we do not control and must never be
//! stalled by a slow consumer.  Each event type travels on its own bounded
//! [`tokio::sync::broadcast`] channel, which gives exactly the overflow policy
//! we want:
//!
//! - `send` never blocks and never fails because a consumer is slow.
//! - When a receiver falls behind by more than the channel capacity, the
//!   **oldest** unread items are discarded and the receiver is told how many
//!   it missed (`RecvError::Lagged`).  The newest items are always kept.
//! - A receiver only sees items sent after it subscribed.  There is no replay.
//!
//! # Capacities
//!
//! Device-found notifications are frequent and mostly name refreshes, so a
//! handful of buffered items is enough.  Finished and error are terminal
//! signals with capacity 1; only a newer signal of the same type can replace
//! a pending one.
//!
//! `broadcast` rounds capacities up to the next power of two, so the defaults
//! are powers of two to keep the effective capacity equal to the configured one.
//!
//! # Ordering
//!
//! [`BusSubscription::recv`] polls the device-found channel before the
//! terminal channels.  A producer that emits `device_found` and then
//! `discovery_finished` therefore always has the device delivered first.

use peerscan_core::{DiscoveryErrorKind, PeerDevice};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, trace};

/// Default capacity of the device-found channel.
pub const DEFAULT_DEVICE_FOUND_CAPACITY: usize = 8;

/// Default capacity of the discovery-finished and error channels.
pub const DEFAULT_TERMINAL_EVENT_CAPACITY: usize = 1;

/// Per-channel buffer sizes for the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusCapacity {
    pub device_found: usize,
    pub terminal: usize,
}

impl Default for BusCapacity {
    fn default() -> Self {
        Self {
            device_found: DEFAULT_DEVICE_FOUND_CAPACITY,
            terminal: DEFAULT_TERMINAL_EVENT_CAPACITY,
        }
    }
}

/// A single event delivered to a bus subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    DeviceFound(PeerDevice),
    DiscoveryFinished,
    ErrorOccurred(DiscoveryErrorKind),
}

/// The three multicast event streams fed by platform callbacks.
pub struct DiscoveryEventBus {
    device_found: broadcast::Sender<PeerDevice>,
    discovery_finished: broadcast::Sender<()>,
    error_occurred: broadcast::Sender<DiscoveryErrorKind>,
    capacity: BusCapacity,
}

impl DiscoveryEventBus {
    /// Creates a bus with the given capacities.  Zero capacities are raised to 1.
    pub fn new(capacity: BusCapacity) -> Self {
        let capacity = BusCapacity {
            device_found: capacity.device_found.max(1),
            terminal: capacity.terminal.max(1),
        };
        let (device_found, _) = broadcast::channel(capacity.device_found);
        let (discovery_finished, _) = broadcast::channel(capacity.terminal);
        let (error_occurred, _) = broadcast::channel(capacity.terminal);
        Self {
            device_found,
            discovery_finished,
            error_occurred,
            capacity,
        }
    }

    pub fn capacity(&self) -> BusCapacity {
        self.capacity
    }

    /// Publishes a device-found event.  Never blocks.
    pub fn emit_device_found(&self, device: PeerDevice) {
        if self.device_found.send(device).is_err() {
            trace!("device-found event discarded: no subscribers");
        }
    }

    /// Publishes a discovery-finished event.  Never blocks.
    pub fn emit_discovery_finished(&self) {
        if self.discovery_finished.send(()).is_err() {
            trace!("discovery-finished event discarded: no subscribers");
        }
    }

    /// Publishes an error event.  Never blocks.
    pub fn emit_error(&self, kind: DiscoveryErrorKind) {
        if self.error_occurred.send(kind).is_err() {
            trace!("error event discarded: no subscribers");
        }
    }

    /// Opens a subscription that sees every event emitted from now on.
    pub fn subscribe(&self) -> BusSubscription {
        BusSubscription {
            device_found: self.device_found.subscribe(),
            discovery_finished: self.discovery_finished.subscribe(),
            error_occurred: self.error_occurred.subscribe(),
            dropped: 0,
        }
    }

    /// Number of live subscriptions (counted on the device-found channel).
    pub fn subscriber_count(&self) -> usize {
        self.device_found.receiver_count()
    }
}

impl Default for DiscoveryEventBus {
    fn default() -> Self {
        Self::new(BusCapacity::default())
    }
}

/// A single consumer's view of the bus.  Dropping it unsubscribes.
pub struct BusSubscription {
    device_found: broadcast::Receiver<PeerDevice>,
    discovery_finished: broadcast::Receiver<()>,
    error_occurred: broadcast::Receiver<DiscoveryErrorKind>,
    dropped: u64,
}

impl BusSubscription {
    /// Waits for the next event.
    ///
    /// Returns `None` once the bus has been dropped.  Overflow loss is
    /// skipped silently (counted in [`dropped`](Self::dropped)).
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            let received = tokio::select! {
                biased;
                r = self.device_found.recv() => r.map(BusEvent::DeviceFound),
                r = self.discovery_finished.recv() => r.map(|()| BusEvent::DiscoveryFinished),
                r = self.error_occurred.recv() => r.map(BusEvent::ErrorOccurred),
            };

            match received {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    self.dropped += missed;
                    debug!("event bus overflow: {missed} oldest event(s) dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Total number of events this subscription lost to overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(i: usize) -> PeerDevice {
        PeerDevice::new(format!("peer-{i}"), format!("00:00:00:00:00:{i:02X}"))
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_emission_order() {
        // Arrange
        let bus = DiscoveryEventBus::default();
        let mut sub = bus.subscribe();

        // Act
        bus.emit_device_found(peer(1));
        bus.emit_device_found(peer(2));
        bus.emit_discovery_finished();

        // Assert
        assert_eq!(sub.recv().await, Some(BusEvent::DeviceFound(peer(1))));
        assert_eq!(sub.recv().await, Some(BusEvent::DeviceFound(peer(2))));
        assert_eq!(sub.recv().await, Some(BusEvent::DiscoveryFinished));
    }

    #[tokio::test]
    async fn test_finished_never_overtakes_earlier_device_found() {
        // Arrange: finished is emitted after a device but on a different channel
        let bus = DiscoveryEventBus::default();
        let mut sub = bus.subscribe();
        bus.emit_device_found(peer(7));
        bus.emit_error(DiscoveryErrorKind::Unknown);

        // Act / Assert
        assert!(matches!(sub.recv().await, Some(BusEvent::DeviceFound(_))));
        assert_eq!(
            sub.recv().await,
            Some(BusEvent::ErrorOccurred(DiscoveryErrorKind::Unknown))
        );
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest_and_keeps_newest() {
        // Arrange
        let bus = DiscoveryEventBus::new(BusCapacity {
            device_found: 8,
            terminal: 1,
        });
        let mut sub = bus.subscribe();

        // Act: 12 events into a buffer of 8
        for i in 0..12 {
            bus.emit_device_found(peer(i));
        }
        bus.emit_discovery_finished();

        let mut received = Vec::new();
        while let Some(event) = sub.recv().await {
            match event {
                BusEvent::DeviceFound(d) => received.push(d),
                _ => break,
            }
        }

        // Assert: the 4 oldest were dropped
        assert_eq!(sub.dropped(), 4);
        assert_eq!(received, (4..12).map(peer).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_late_subscriber_does_not_see_earlier_events() {
        // Arrange
        let bus = DiscoveryEventBus::default();
        let _early = bus.subscribe();
        bus.emit_device_found(peer(1));

        // Act
        let mut late = bus.subscribe();
        bus.emit_device_found(peer(2));

        // Assert
        assert_eq!(late.recv().await, Some(BusEvent::DeviceFound(peer(2))));
    }

    #[test]
    fn test_emit_without_subscribers_does_not_panic() {
        let bus = DiscoveryEventBus::default();
        bus.emit_device_found(peer(1));
        bus.emit_discovery_finished();
        bus.emit_error(DiscoveryErrorKind::DiscoveryNotPossible);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let bus = DiscoveryEventBus::new(BusCapacity {
            device_found: 0,
            terminal: 0,
        });
        assert_eq!(
            bus.capacity(),
            BusCapacity {
                device_found: 1,
                terminal: 1
            }
        );
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let bus = DiscoveryEventBus::default();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub);

        assert_eq!(bus.subscriber_count(), 0);
    }
}
