//! Observer hooks for channel lifecycle events.
//!
//! The manager and its interceptor report refreshes, graceful closes and
//! retries to any number of listeners. Plain closures taking `&E` are
//! listeners too.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// An event about the channel to one target.
pub trait LifecycleEvent: fmt::Debug + Send + Sync {
    /// Stable name of the event kind, e.g. `"Established"`.
    fn event_type(&self) -> &'static str;

    /// Target address of the emitting manager.
    fn target(&self) -> &str;
}

pub trait EventListener<E>: Send + Sync {
    fn on_event(&self, event: &E);
}

impl<E, F> EventListener<E> for F
where
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        self(event)
    }
}

/// Listeners for one event type, notified in registration order.
pub struct EventListeners<E> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E: LifecycleEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Notifies every listener. A listener that panics does not keep the
    /// others from seeing the event.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let _ = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<E: LifecycleEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventListeners<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
        }
    }
}

impl<E> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventListeners({})", self.listeners.len())
    }
}
