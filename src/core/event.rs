//! Synchronous publish/subscribe primitive.
//!
//! A [`Subject`] fans a value out to every subscribed listener, in
//! subscription order, on the caller's stack. Listeners are snapshotted at the
//! start of each [`Subject::emit`], so a listener that subscribes, unsubscribes
//! or re-emits while an emit is running only affects the *next* emit.
//!
//! Nothing is buffered: a listener that subscribes after an emit never sees it.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

#[cfg(feature = "transport")]
use tokio::sync::mpsc;

use super::lock;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
}

impl<T> Registry<T> {
    fn remove(&mut self, id: u64) {
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
    }
}

/// An event source that can both publish and accept subscribers.
pub struct Subject<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T: 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("listeners", &lock(&self.registry).listeners.len())
            .finish()
    }
}

impl<T: 'static> Subject<T> {
    /// Create a subject with no listeners.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is unsubscribed or dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.push((id, Arc::new(listener)));
            id
        };

        let registry: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                lock(&registry).remove(id);
            }
        })
    }

    /// Invoke every currently subscribed listener with `value`.
    pub fn emit(&self, value: T) {
        let snapshot: Vec<Listener<T>> = lock(&self.registry)
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(&value);
        }
    }

    /// A subscribe-only view of this subject.
    pub fn stream(&self) -> EventStream<T> {
        EventStream {
            subject: self.clone(),
        }
    }
}

/// Subscribe-only handle to a [`Subject`].
///
/// Components hand these out so that callers can observe events without being
/// able to publish them.
pub struct EventStream<T> {
    subject: Subject<T>,
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            subject: self.subject.clone(),
        }
    }
}

impl<T> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventStream").field(&self.subject).finish()
    }
}

impl<T: 'static> EventStream<T> {
    /// Register a listener. See [`Subject::subscribe`].
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subject.subscribe(listener)
    }

    /// Forward every event into an unbounded channel.
    ///
    /// The channel stops receiving once the subscription is dropped.
    #[cfg(feature = "transport")]
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<T>)
    where
        T: Clone + Send,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subject.subscribe(move |value: &T| {
            let _ = tx.send(value.clone());
        });
        (subscription, rx)
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping it unsubscribes the listener.
#[must_use = "dropping a Subscription unsubscribes the listener immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Remove the listener. Equivalent to dropping the subscription.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
