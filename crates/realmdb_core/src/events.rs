//! Synchronous event bus for store-level domain events.
//!
//! The bus is an explicitly constructed value passed to whoever publishes
//! or subscribes; there is no process-global registry. Delivery is
//! synchronous and in registration order. A failing subscriber is logged
//! and skipped; it never rolls back the storage operation that triggered
//! the event.

use parking_lot::RwLock;
use tracing::warn;

/// Boxed error a subscriber may return.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

type Subscriber<E> = Box<dyn Fn(&StoreEvent<E>) -> Result<(), SubscriberError> + Send + Sync>;

/// A typed event describing a committed-or-in-flight entity change.
#[derive(Debug, Clone)]
pub enum StoreEvent<E> {
    /// An entity was created.
    Created(E),
    /// An entity was updated.
    Updated(E),
    /// An entity is being removed.
    ///
    /// Publishers emit this before the physical delete, so a subscriber
    /// may still observe the entity during its own removal.
    Removed(E),
}

impl<E> StoreEvent<E> {
    /// The entity snapshot carried by the event.
    pub fn entity(&self) -> &E {
        match self {
            Self::Created(e) | Self::Updated(e) | Self::Removed(e) => e,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::Removed(_) => "removed",
        }
    }
}

/// A subscriber registry with synchronous delivery.
pub struct EventBus<E> {
    subscribers: RwLock<Vec<Subscriber<E>>>,
}

impl<E> EventBus<E> {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Registers a subscriber. Subscribers run synchronously, in
    /// registration order, on the publishing thread.
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&StoreEvent<E>) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.subscribers.write().push(Box::new(subscriber));
    }

    /// Delivers an event to every subscriber.
    ///
    /// A subscriber error is logged and does not stop delivery to later
    /// subscribers or affect the triggering operation.
    pub fn publish(&self, event: &StoreEvent<E>) {
        for (index, subscriber) in self.subscribers.read().iter().enumerate() {
            if let Err(error) = subscriber(event) {
                warn!(
                    subscriber = index,
                    event = event.kind(),
                    %error,
                    "event subscriber failed"
                );
            }
        }
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
