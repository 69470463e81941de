//! Domain event bus.
//!
//! Writers publish AFTER their repository call has returned, i.e. after the
//! underlying transaction committed. Listeners therefore never observe an
//! event for state that is not yet visible to readers, which is what the
//! delayed double delete in the cache layer relies on.

use codetop_domain::DomainEvent;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event; lagging subscribers drop oldest events rather than
    /// blocking the writer.
    pub fn publish(&self, event: DomainEvent) {
        // Send fails only when no subscriber exists, which is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let event = DomainEvent::ReviewCompleted {
            user_id: Uuid::nil(),
            problem_id: 7,
            rating: 3,
        };
        bus.publish(event.clone());

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(DomainEvent::ProblemUpdated { problem_id: 1 });
    }
}
