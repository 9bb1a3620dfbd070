//! Typed publish/subscribe for the four framework events: `status`,
//! `route-change`, `location`, and `build-id`.
//!
//! Subscribers receive immutable event values and are invoked synchronously,
//! in registration order. Subscriptions are removed explicitly via the
//! returned handle, never implicitly on drop.

use crate::{nav::status::Status, scroll::ScrollState};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

/// Payload of the `route-change` event, emitted once per committed
/// navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteChangeEvent {
    /// Where the page should scroll after this commit, if anywhere.
    pub scroll_state: Option<ScrollState>,
}

/// Payload of the `build-id` event, emitted whenever a response reveals that
/// the server artifact set changed under us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildIdEvent {
    /// The build id we were on.
    pub old_id: String,
    /// The build id the server is on now.
    pub new_id: String,
}

struct Listeners<T> {
    inner: Rc<RefCell<Vec<(u64, Rc<dyn Fn(&T)>)>>>,
    next_id: Cell<u64>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Vec::new())),
            next_id: Cell::new(0),
        }
    }
}

impl<T: 'static> Listeners<T> {
    fn subscribe(&self, cb: impl Fn(&T) + 'static) -> EventSubscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.inner.borrow_mut().push((id, Rc::new(cb)));
        let inner = Rc::clone(&self.inner);
        EventSubscription(Box::new(move || {
            inner.borrow_mut().retain(|(entry_id, _)| *entry_id != id);
        }))
    }

    fn emit(&self, value: &T) {
        // snapshot first: a listener may subscribe or unsubscribe re-entrantly
        let listeners: Vec<_> = self
            .inner
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        for cb in listeners {
            cb(value);
        }
    }
}

/// A handle that can be called to remove an event listener.
pub struct EventSubscription(Box<dyn FnOnce()>);

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EventSubscription").finish()
    }
}

impl EventSubscription {
    /// Removes the listener.
    pub fn remove(self) {
        (self.0)()
    }
}

/// The process-wide event bus.
#[derive(Default)]
pub struct EventBus {
    status: Listeners<Status>,
    route_change: Listeners<RouteChangeEvent>,
    location: Listeners<()>,
    build_id: Listeners<BuildIdEvent>,
}

impl EventBus {
    pub fn on_status(&self, cb: impl Fn(&Status) + 'static) -> EventSubscription {
        self.status.subscribe(cb)
    }

    pub fn on_route_change(&self, cb: impl Fn(&RouteChangeEvent) + 'static) -> EventSubscription {
        self.route_change.subscribe(cb)
    }

    pub fn on_location(&self, cb: impl Fn(&()) + 'static) -> EventSubscription {
        self.location.subscribe(cb)
    }

    pub fn on_build_id(&self, cb: impl Fn(&BuildIdEvent) + 'static) -> EventSubscription {
        self.build_id.subscribe(cb)
    }

    pub(crate) fn emit_status(&self, status: &Status) {
        self.status.emit(status);
    }

    pub(crate) fn emit_route_change(&self, event: &RouteChangeEvent) {
        self.route_change.emit(event);
    }

    pub(crate) fn emit_location(&self) {
        self.location.emit(&());
    }

    pub(crate) fn emit_build_id(&self, event: &BuildIdEvent) {
        self.build_id.emit(event);
    }
}
