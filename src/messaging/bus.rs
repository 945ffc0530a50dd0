/// In-process broadcast of [`Event`]s
///
/// Every subscriber owns a bounded channel. Publishing never blocks: a full
/// channel misses the event, a closed one is pruned.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;

use super::events::Event;

/// Per-subscriber backlog
const SUBSCRIBER_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

struct Subscriber {
    id: SubscriberId,
    sender: Sender<Event>,
}

/// Cloneable handle; all clones share one subscriber list.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
    next_id: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn subscribe(&self) -> (Receiver<Event>, SubscriberId) {
        let (sender, receiver) = bounded(SUBSCRIBER_CAPACITY);
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push(Subscriber { id, sender });
        (receiver, id)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.write().retain(|s| s.id != id);
    }

    pub fn publish(&self, event: Event) {
        tracing::debug!("event: {}", event.description());

        let mut closed = Vec::new();
        for subscriber in self.subscribers.read().iter() {
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => closed.push(subscriber.id),
            }
        }

        if !closed.is_empty() {
            self.subscribers.write().retain(|s| !closed.contains(&s.id));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
