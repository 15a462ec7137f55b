use crate::lifecycle::LifecycleError;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 100;

/// Notifications emitted while the lifecycle runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A latch task completed; `remain` tasks are still pending
    ReadyStat {
        latch: String,
        id: String,
        remain: usize,
    },
    /// A latch timed out while `id` was still pending
    ReadyTimeout { latch: String, id: String },
    /// A hook or phase failed
    Error(LifecycleError),
    /// Teardown finished; published once
    Close,
}

/// A simple in-memory event bus for lifecycle notifications
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus buffering up to `capacity` events per slow subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event
    ///
    /// Events published while nobody is subscribed are dropped.
    pub fn publish(&self, event: LifecycleEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(LifecycleEvent::Close);

        assert_eq!(first.recv().await.unwrap(), LifecycleEvent::Close);
        assert_eq!(second.recv().await.unwrap(), LifecycleEvent::Close);
    }

    #[test]
    fn test_publish_without_subscribers_is_ignored() {
        let bus = EventBus::with_capacity(0);
        bus.publish(LifecycleEvent::Close);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
