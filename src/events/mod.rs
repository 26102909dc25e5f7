//! In-process named event bus.
//!
//! Handlers run synchronously on the emitting thread. Emission never waits on
//! subscribers and there is no backpressure.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    handlers: HashMap<String, Vec<(u64, Handler<T>)>>,
}

impl<T> Registry<T> {
    fn remove(&mut self, name: &str, id: u64) -> bool {
        let Some(entry) = self.handlers.get_mut(name) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|(hid, _)| *hid != id);
        let removed = entry.len() < before;
        if entry.is_empty() {
            self.handlers.remove(name);
        }
        removed
    }
}

/// Publish/subscribe keyed by event name.
pub struct EventBus<T> {
    registry: Arc<RwLock<Registry<T>>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T: Clone + 'static> EventBus<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry {
                next_id: 0,
                handlers: HashMap::new(),
            })),
        }
    }

    /// Register `handler` for `name`. The handler stays registered until the
    /// returned [`Subscription`] is cancelled or dropped.
    pub fn subscribe<F>(&self, name: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let name = name.into();
        let handler: Handler<T> = Arc::new(handler);
        let id = {
            let mut reg = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            let id = reg.next_id;
            reg.next_id += 1;
            reg.handlers
                .entry(name.clone())
                .or_default()
                .push((id, handler));
            id
        };

        let weak: Weak<RwLock<Registry<T>>> = Arc::downgrade(&self.registry);
        let event_name = name.clone();
        Subscription {
            event_name,
            cancel: Some(Box::new(move || {
                if let Some(reg) = weak.upgrade() {
                    reg.write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&name, id);
                }
            })),
        }
    }

    /// Deliver `payload` to every handler of `name`; returns how many ran.
    ///
    /// Handlers are called outside the registry lock, so they may emit or
    /// subscribe themselves.
    pub fn emit(&self, name: &str, payload: T) -> usize {
        let handlers: Vec<Handler<T>> = {
            let reg = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            match reg.handlers.get(name) {
                Some(v) => v.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return 0,
            }
        };
        let count = handlers.len();
        for handler in handlers {
            handler(payload.clone());
        }
        count
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .get(name)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl<T: Clone + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for one registered handler. Dropping it unsubscribes.
pub struct Subscription {
    event_name: String,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn cancel(mut self) {
        self.unsubscribe();
    }

    fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event_name", &self.event_name)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_reaches_only_matching_name() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = bus.subscribe("user.created", move |v: u32| s.lock().unwrap().push(v));

        assert_eq!(bus.emit("user.created", 1), 1);
        assert_eq!(bus.emit("user.deleted", 2), 0);
        assert_eq!(bus.emit("user.created", 3), 1);
        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_cancel_and_drop_unsubscribe() {
        let bus: EventBus<u8> = EventBus::new();
        let a = bus.subscribe("tick", |_| {});
        let b = bus.subscribe("tick", |_| {});
        assert_eq!(bus.subscriber_count("tick"), 2);
        assert_eq!(a.event_name(), "tick");

        a.cancel();
        assert_eq!(bus.subscriber_count("tick"), 1);
        drop(b);
        assert_eq!(bus.subscriber_count("tick"), 0);
        assert_eq!(bus.emit("tick", 0), 0);
    }

    #[test]
    fn test_subscription_outliving_bus_is_harmless() {
        let bus: EventBus<u8> = EventBus::new();
        let sub = bus.subscribe("tick", |_| {});
        drop(bus);
        sub.cancel();
    }

    #[test]
    fn test_handler_may_emit_reentrantly() {
        let bus: EventBus<u32> = EventBus::new();
        let inner_bus = bus.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _echo = bus.subscribe("ping", move |v: u32| {
            inner_bus.emit("pong", v + 1);
        });
        let _sink = bus.subscribe("pong", move |v: u32| s.lock().unwrap().push(v));
        bus.emit("ping", 41);
        assert_eq!(*seen.lock().unwrap(), vec![42]);
    }
}
