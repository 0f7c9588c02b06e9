use std::cell::Cell;
use std::fmt;

/// Names of the lifecycle events raised by the pod manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    AfterDispense,
    AfterOpen,
    BeforeStore,
    AfterStore,
    BeforeDelete,
    AfterDelete,
}

impl Lifecycle {
    pub const ALL: [Lifecycle; 6] = [
        Lifecycle::AfterDispense,
        Lifecycle::AfterOpen,
        Lifecycle::BeforeStore,
        Lifecycle::AfterStore,
        Lifecycle::BeforeDelete,
        Lifecycle::AfterDelete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::AfterDispense => "after_dispense",
            Lifecycle::AfterOpen => "after_open",
            Lifecycle::BeforeStore => "before_store",
            Lifecycle::AfterStore => "after_store",
            Lifecycle::BeforeDelete => "before_delete",
            Lifecycle::AfterDelete => "after_delete",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Lifecycle::ALL.into_iter().find(|event| event.as_str() == name)
    }

    pub fn names() -> Vec<&'static str> {
        Lifecycle::ALL.iter().map(|event| event.as_str()).collect()
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named event carrying a payload.
///
/// The name and payload are fixed at construction. The only mutable part is
/// the propagation flag, which listeners set through a shared reference.
pub struct Event<P> {
    name: String,
    payload: P,
    stopped: Cell<bool>,
}

impl<P> Event<P> {
    pub fn new(name: impl Into<String>, payload: P) -> Self {
        Event {
            name: name.into(),
            payload,
            stopped: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Prevents any further listener from receiving this event.
    pub fn stop_propagation(&self) {
        self.stopped.set(true);
    }

    pub fn propagation_stopped(&self) -> bool {
        self.stopped.get()
    }
}

impl<P: fmt::Debug> fmt::Debug for Event<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("payload", &self.payload)
            .field("stopped", &self.stopped.get())
            .finish()
    }
}

/// One or more event names, as accepted by `Observable::attach`.
///
/// A bare name and a list of names are both valid specifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNames(Vec<String>);

impl EventNames {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for EventNames {
    fn from(name: &str) -> Self {
        EventNames(vec![name.to_string()])
    }
}

impl From<String> for EventNames {
    fn from(name: String) -> Self {
        EventNames(vec![name])
    }
}

impl From<Lifecycle> for EventNames {
    fn from(event: Lifecycle) -> Self {
        EventNames(vec![event.as_str().to_string()])
    }
}

impl From<&[&str]> for EventNames {
    fn from(names: &[&str]) -> Self {
        EventNames(names.iter().map(|n| n.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for EventNames {
    fn from(names: [&str; N]) -> Self {
        EventNames(names.iter().map(|n| n.to_string()).collect())
    }
}

impl From<Vec<&str>> for EventNames {
    fn from(names: Vec<&str>) -> Self {
        EventNames(names.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for EventNames {
    fn from(names: Vec<String>) -> Self {
        EventNames(names)
    }
}

impl From<&[Lifecycle]> for EventNames {
    fn from(events: &[Lifecycle]) -> Self {
        EventNames(events.iter().map(|e| e.as_str().to_string()).collect())
    }
}
