//! In-process fan-out of freshly recorded events to whichever component
//! owns delivery to clients.
//!
//! This is strictly a liveliness optimisation: the durable record written
//! by [`crate::record::record`] is the source of truth, and a subscriber
//! that lags or is absent at publish time loses nothing it couldn't
//! recover by re-reading the store. `hyperspace-session` subscribes here
//! so it can enqueue a notification the moment its event is committed,
//! rather than polling.

use std::sync::Arc;

use hyperspace_core::{Event, HandleId};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default channel capacity: enough to absorb a burst of recipients on
/// one event without a slow subscriber forcing every other subscriber to
/// immediately lag.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// An event together with the recipient handles computed for it, as
/// published immediately after its owning transaction commits.
#[derive(Debug, Clone)]
pub struct DispatchedEvent {
    /// The event that was recorded.
    pub event: Event,
    /// Handles that should receive a notification for this event.
    pub recipients: Vec<HandleId>,
}

/// Broadcasts newly committed events to every subscriber.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<DispatchedEvent>>,
}

impl EventBus {
    /// Create a bus with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with a specific channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a dispatched event. Returns the number of subscribers it
    /// was delivered to; zero is not an error; nothing is bound to
    /// notice immediately.
    pub fn publish(&self, dispatched: DispatchedEvent) -> usize {
        let dispatched = Arc::new(dispatched);
        match self.sender.send(dispatched) {
            Ok(count) => count,
            Err(_) => 0,
        }
    }

    /// Subscribe to the stream of dispatched events.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver { receiver: self.sender.subscribe() }
    }

    /// The current number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscription to the event bus.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<DispatchedEvent>>,
}

impl EventReceiver {
    /// Wait for the next dispatched event. Returns `None` once the bus
    /// itself has been dropped.
    pub async fn recv(&mut self) -> Option<Arc<DispatchedEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event bus subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive; `None` if nothing is queued right now.
    pub fn try_recv(&mut self) -> Option<Arc<DispatchedEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event bus subscriber lagged, events dropped");
                }
                Err(
                    broadcast::error::TryRecvError::Empty
                    | broadcast::error::TryRecvError::Closed,
                ) => {
                    trace!("no event available");
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_core::EventKind;

    fn sample_event() -> Event {
        Event {
            id: hyperspace_core::EventId::new(1),
            kind: EventKind::LockReleased,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_a_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let dispatched = DispatchedEvent { event: sample_event(), recipients: vec![] };

        let count = bus.publish(dispatched);
        assert_eq!(count, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event.id, sample_event().id);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_not_an_error() {
        let bus = EventBus::new();
        let dispatched = DispatchedEvent { event: sample_event(), recipients: vec![] };
        assert_eq!(bus.publish(dispatched), 0);
    }

    #[tokio::test]
    async fn try_recv_is_empty_with_nothing_published() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_none());
    }
}
