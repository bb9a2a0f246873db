//! Publish/subscribe event bus.
//!
//! A thin wrapper over a Tokio broadcast channel. Events published while
//! nobody listens are dropped; slow subscribers may observe a lag.

use std::fmt;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

/// Broadcast bus delivering each event to all current subscribers.
///
/// # Examples
///
/// ```
/// use vaultbuild_core::EventBus;
///
/// let bus: EventBus<&'static str> = EventBus::new();
/// let mut rx = bus.subscribe();
/// bus.publish("started");
/// assert_eq!(rx.try_recv().unwrap(), "started");
/// ```
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Creates a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event and returns the number of subscribers reached.
    pub fn publish(&self, event: E) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribes to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus: EventBus<u8> = EventBus::new();
        assert_eq!(bus.publish(1), 0);
    }

    #[test]
    fn test_every_subscriber_receives() {
        let bus: EventBus<u8> = EventBus::with_capacity(4);
        let mut a = bus.subscribe();
        let mut b = bus.clone().subscribe();
        assert_eq!(bus.publish(7), 2);
        assert_eq!(a.try_recv().unwrap(), 7);
        assert_eq!(b.try_recv().unwrap(), 7);
    }
}
