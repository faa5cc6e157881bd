//! Process-wide publish/subscribe channel used to invalidate list views.
//!
//! Delivery is synchronous: `publish` runs every handler registered for the
//! topic, in registration order, before returning. Handlers must not block;
//! list controllers react by spawning a refetch.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tracing::debug;

pub type NotificationHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscriber {
    topic: String,
    handler: NotificationHandler,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: BTreeMap<SubscriptionId, Subscriber>,
}

#[derive(Clone, Default)]
pub struct NotificationBus {
    inner: Arc<Mutex<BusInner>>,
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.inner.lock().subscribers.len())
            .finish()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> SubscriptionHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let topic = topic.into();
        let id = {
            let mut guard = self.inner.lock();
            let id = SubscriptionId(guard.next_id);
            guard.next_id += 1;
            guard.subscribers.insert(
                id,
                Subscriber {
                    topic: topic.clone(),
                    handler: Arc::new(handler),
                },
            );
            id
        };
        debug!(topic = %topic, subscription = id.0, "bus: subscribed");
        SubscriptionHandle {
            id,
            topic,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Releases a subscription. Equivalent to dropping the handle.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        drop(handle);
    }

    /// Notifies every subscriber of `topic` and returns how many were reached.
    pub fn publish(&self, topic: &str) -> usize {
        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<NotificationHandler> = {
            let guard = self.inner.lock();
            guard
                .subscribers
                .values()
                .filter(|subscriber| subscriber.topic == topic)
                .map(|subscriber| Arc::clone(&subscriber.handler))
                .collect()
        };
        debug!(topic, subscribers = handlers.len(), "bus: publish");
        for handler in &handlers {
            handler();
        }
        handlers.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .subscribers
            .values()
            .filter(|subscriber| subscriber.topic == topic)
            .count()
    }
}

/// Registration on a [`NotificationBus`]; unsubscribes when dropped.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    topic: String,
    bus: Weak<Mutex<BusInner>>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        // Bind the removed subscriber so its handler drops after the lock is released.
        let removed = inner.lock().subscribers.remove(&self.id);
        if removed.is_some() {
            debug!(topic = %self.topic, subscription = self.id.0, "bus: unsubscribed");
        }
    }
}

#[cfg(test)]
#[path = "tests/notification_bus_tests.rs"]
mod tests;
