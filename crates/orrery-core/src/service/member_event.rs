// Member change event handling
// Provides event-driven notifications for cluster membership changes

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use orrery_common::{MemberChangeEvent, MemberChangeType, MembershipListener};

/// Member change event publisher
/// Delivers events to registered listeners on the publishing thread and to
/// async subscribers through a bounded broadcast queue
pub struct MemberChangeEventPublisher {
    /// Broadcast sender for async subscribers
    broadcast_tx: broadcast::Sender<MemberChangeEvent>,
    /// Registered listeners
    listeners: RwLock<Vec<Arc<dyn MembershipListener>>>,
}

impl MemberChangeEventPublisher {
    /// Create a new event publisher; `queue_size` must be non-zero
    pub fn new(queue_size: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(queue_size);

        Self {
            broadcast_tx,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener for member change events
    pub fn register_listener(&self, listener: Arc<dyn MembershipListener>) {
        let mut listeners = self.listeners.write();
        listeners.push(listener);
        debug!(
            "Registered member change listener, total: {}",
            listeners.len()
        );
    }

    /// Remove the first registration of `listener`
    pub fn unregister_listener(&self, listener: &Arc<dyn MembershipListener>) -> bool {
        let mut listeners = self.listeners.write();
        let Some(position) = listeners
            .iter()
            .position(|l| std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)))
        else {
            return false;
        };
        listeners.remove(position);
        debug!(
            "Unregistered member change listener, total: {}",
            listeners.len()
        );
        true
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Publish a member change event
    pub fn publish(&self, event: MemberChangeEvent) {
        info!(
            "Publishing member change event: {} for {}",
            event.change_type, event.node_url
        );

        // Lagging or absent subscribers are not an error
        let _ = self.broadcast_tx.send(event.clone());

        // Listeners may register or unregister listeners while being notified
        let listeners: Vec<_> = self.listeners.read().clone();
        for listener in listeners {
            listener.on_member_change(&event);
        }
    }

    /// Subscribe to member change events
    pub fn subscribe(&self) -> broadcast::Receiver<MemberChangeEvent> {
        self.broadcast_tx.subscribe()
    }
}

/// A simple logging listener for debugging
pub struct LoggingMemberChangeListener;

impl MembershipListener for LoggingMemberChangeListener {
    fn on_member_change(&self, event: &MemberChangeEvent) {
        match event.change_type {
            MemberChangeType::MemberJoin => {
                info!("[MemberEvent] Member joined: {}", event.node_url);
            }
            MemberChangeType::MemberLeave => {
                info!("[MemberEvent] Member left: {}", event.node_url);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Collecting(Mutex<Vec<MemberChangeEvent>>);

    impl MembershipListener for Collecting {
        fn on_member_change(&self, event: &MemberChangeEvent) {
            self.0.lock().push(event.clone());
        }
    }

    #[test]
    fn test_event_publisher() {
        let publisher = MemberChangeEventPublisher::new(100);
        let mut receiver = publisher.subscribe();

        publisher.publish(MemberChangeEvent::member_join("http://node1:8080"));

        let received = receiver.try_recv();
        assert!(received.is_ok());
        assert_eq!(received.unwrap().change_type, MemberChangeType::MemberJoin);
    }

    #[test]
    fn test_listeners_notified() {
        let publisher = MemberChangeEventPublisher::new(16);
        let collecting = Arc::new(Collecting(Mutex::new(Vec::new())));
        publisher.register_listener(collecting.clone());
        publisher.register_listener(Arc::new(LoggingMemberChangeListener));

        publisher.publish(MemberChangeEvent::member_join("http://node2:8080"));
        publisher.publish(MemberChangeEvent::member_leave("http://node2:8080"));

        let events = collecting.0.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].change_type, MemberChangeType::MemberJoin);
        assert_eq!(events[1].change_type, MemberChangeType::MemberLeave);
        assert_eq!(events[1].node_url, "http://node2:8080");
    }

    #[test]
    fn test_unregister_listener() {
        let publisher = MemberChangeEventPublisher::new(16);
        let collecting = Arc::new(Collecting(Mutex::new(Vec::new())));
        let listener: Arc<dyn MembershipListener> = collecting.clone();
        publisher.register_listener(listener.clone());
        assert_eq!(publisher.listener_count(), 1);

        assert!(publisher.unregister_listener(&listener));
        assert!(!publisher.unregister_listener(&listener));
        assert_eq!(publisher.listener_count(), 0);

        publisher.publish(MemberChangeEvent::member_join("http://node2:8080"));
        assert!(collecting.0.lock().is_empty());
    }
}
