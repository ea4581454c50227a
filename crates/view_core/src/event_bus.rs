//! Single-threaded publish/subscribe primitive embedded by every stateful object.
//!
//! Each owner defines a closed event enum and a `Kind` discriminant for it. Dispatch is
//! synchronous, in registration order, over a snapshot of the listener list taken when
//! `emit` starts, so listeners removed mid-dispatch still see the current event.

use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    hash::Hash,
    panic::{self, AssertUnwindSafe},
    rc::{Rc, Weak},
};

use tracing::error;

pub trait BusEvent {
    type Kind: Copy + Eq + Hash + fmt::Debug;

    fn kind(&self) -> Self::Kind;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler<E> = Rc<dyn Fn(&E)>;

struct BusInner<E: BusEvent> {
    listeners: HashMap<E::Kind, Vec<(ListenerId, Handler<E>)>>,
    next_id: u64,
    destroyed: bool,
}

impl<E: BusEvent> BusInner<E> {
    fn remove(&mut self, kind: E::Kind, id: ListenerId) -> bool {
        let Some(listeners) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        before != listeners.len()
    }
}

pub struct EventBus<E: BusEvent> {
    inner: Rc<RefCell<BusInner<E>>>,
}

impl<E: BusEvent> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(BusInner {
                listeners: HashMap::new(),
                next_id: 0,
                destroyed: false,
            })),
        }
    }

    /// A bus that was never live; used as the target for subscriptions on dead handles.
    pub fn detached() -> Self {
        let bus = Self::new();
        bus.destroy();
        bus
    }

    /// Registers `handler` for `kind`. The same closure logic registered twice runs twice.
    pub fn on(&self, kind: E::Kind, handler: impl Fn(&E) + 'static) -> Subscription<E> {
        let mut inner = self.inner.borrow_mut();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;

        if inner.destroyed {
            return Subscription {
                bus: Weak::new(),
                kind,
                id,
            };
        }

        let handler: Handler<E> = Rc::new(handler);
        inner.listeners.entry(kind).or_default().push((id, handler));

        Subscription {
            bus: Rc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    pub fn off(&self, kind: E::Kind, id: ListenerId) -> bool {
        self.inner.borrow_mut().remove(kind, id)
    }

    pub fn emit(&self, event: &E) {
        let kind = event.kind();
        let handlers = {
            let inner = self.inner.borrow();
            if inner.destroyed {
                return;
            }
            match inner.listeners.get(&kind) {
                Some(listeners) => listeners.clone(),
                None => return,
            }
        };

        for (id, handler) in handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(event)));
            if let Err(payload) = outcome {
                error!(
                    event_kind = ?kind,
                    listener = id.0,
                    reason = panic_message(payload.as_ref()),
                    "event listener panicked; continuing dispatch"
                );
            }
        }
    }

    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.inner
            .borrow()
            .listeners
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Drops every listener. Later `on` calls return inert subscriptions.
    pub fn destroy(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.destroyed = true;
        inner.listeners.clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().destroyed
    }
}

/// Handle returned by [`EventBus::on`]. Dropping it keeps the listener registered.
pub struct Subscription<E: BusEvent> {
    bus: Weak<RefCell<BusInner<E>>>,
    kind: E::Kind,
    id: ListenerId,
}

impl<E: BusEvent> Subscription<E> {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn kind(&self) -> E::Kind {
        self.kind
    }

    pub fn unsubscribe(self) -> bool {
        match self.bus.upgrade() {
            Some(inner) => inner.borrow_mut().remove(self.kind, self.id),
            None => false,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
#[path = "tests/event_bus_tests.rs"]
mod tests;
