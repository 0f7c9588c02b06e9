use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{PodError, ToolboxError};
use crate::event::{Event, EventNames};

/// A listener that can be attached to an `Observable`.
pub trait Observer<P> {
    /// Receives an event. Returning an error aborts the notification and
    /// propagates the error to whoever called `notify`.
    fn on_event(&self, event: &Event<P>) -> Result<(), ToolboxError>;
}

type Listener<P> = Weak<dyn Observer<P>>;

/// Per-event listener lists with ordered, identity-based registration.
///
/// Listeners are held weakly: an observer that has been dropped is skipped
/// and pruned on the next notification. Dispatch works on a snapshot of the
/// list, so listeners may attach or detach while being notified.
pub struct Observable<P> {
    listeners: RefCell<IndexMap<String, Vec<Listener<P>>>>,
}

fn same_listener<P>(held: &Listener<P>, candidate: &Rc<dyn Observer<P>>) -> bool {
    std::ptr::addr_eq(held.as_ptr(), Rc::as_ptr(candidate))
}

impl<P> Observable<P> {
    pub fn new() -> Self {
        Observable {
            listeners: RefCell::new(IndexMap::new()),
        }
    }

    /// Attaches a listener to one or more events.
    ///
    /// Attaching the same listener to the same event twice is a no-op.
    pub fn attach(
        &self,
        events: impl Into<EventNames>,
        listener: &Rc<dyn Observer<P>>,
    ) -> Result<(), PodError> {
        let events = events.into();
        if events.is_empty() {
            return Err(PodError::Configuration(
                "at least one event name is required".to_string(),
            ));
        }
        if events.iter().any(str::is_empty) {
            return Err(PodError::Configuration(
                "event names must not be empty".to_string(),
            ));
        }

        let mut listeners = self.listeners.borrow_mut();
        for name in events.iter() {
            let list = listeners.entry(name.to_string()).or_default();
            if !list.iter().any(|held| same_listener(held, listener)) {
                list.push(Rc::downgrade(listener));
            }
        }
        Ok(())
    }

    /// Removes the first registration of `listener` for `event`.
    /// Returns whether anything was removed.
    pub fn detach(&self, event: &str, listener: &Rc<dyn Observer<P>>) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(list) = listeners.get_mut(event) else {
            return false;
        };
        match list.iter().position(|held| same_listener(held, listener)) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn detach_all_observers_for_event(&self, event: &str) {
        self.listeners.borrow_mut().shift_remove(event);
    }

    pub fn detach_all_events_for_observer(&self, listener: &Rc<dyn Observer<P>>) {
        for list in self.listeners.borrow_mut().values_mut() {
            list.retain(|held| !same_listener(held, listener));
        }
    }

    /// Returns the number of live listeners attached to `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .borrow()
            .get(event)
            .map(|list| list.iter().filter(|held| held.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Builds an event and delivers it to every listener of `name`, in
    /// attachment order, until one of them stops propagation.
    pub fn notify(&self, name: &str, payload: P) -> Result<Event<P>, ToolboxError> {
        let event = Event::new(name, payload);
        let snapshot: Vec<Listener<P>> = match self.listeners.borrow().get(name) {
            Some(list) => list.clone(),
            None => return Ok(event),
        };

        let mut saw_dropped = false;
        for held in &snapshot {
            let Some(listener) = held.upgrade() else {
                saw_dropped = true;
                continue;
            };
            listener.on_event(&event)?;
            if event.propagation_stopped() {
                trace!(event = name, "propagation stopped");
                break;
            }
        }

        if saw_dropped {
            self.prune(name);
        }
        Ok(event)
    }

    fn prune(&self, name: &str) {
        if let Some(list) = self.listeners.borrow_mut().get_mut(name) {
            list.retain(|held| held.strong_count() > 0);
        }
    }
}

impl<P> Default for Observable<P> {
    fn default() -> Self {
        Self::new()
    }
}
