//! Broadcast event bus for fanning `WorkflowEvent`s out to async subscribers.
//!
//! Built on `tokio::sync::broadcast`. Publishing with no active subscribers is
//! a no-op. The bus implements [`EventSink`] so it can be handed straight to
//! the engine.

use flowgate_types::event::WorkflowEvent;
use tokio::sync::broadcast;

use super::sink::EventSink;

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Multi-consumer bus for workflow events.
///
/// Cloning the bus clones the sender.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Publish to all current subscribers; dropped if there are none.
    pub fn publish(&self, event: WorkflowEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: &WorkflowEvent) {
        self.publish(event.clone());
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_types::event::WorkflowEventKind;

    fn started() -> WorkflowEvent {
        WorkflowEvent::now("exec-1", WorkflowEventKind::ExecutionStarted { attempt: 1 })
    }

    #[tokio::test]
    async fn every_subscriber_receives_events() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(&started());

        assert_eq!(rx1.recv().await.unwrap().execution_id, "exec-1");
        assert_eq!(rx2.recv().await.unwrap().type_name(), "execution.started");
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::default();
        bus.publish(started());
    }

    #[tokio::test]
    async fn clones_share_the_channel() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        bus.clone().publish(started());
        assert!(rx.recv().await.is_ok());
        assert!(format!("{bus:?}").contains("receiver_count"));
    }
}
