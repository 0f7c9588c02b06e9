//! Pods: the mapped entities behind models.
//!
//! A pod owns a record's identity (`_id`, derived `_key`, `_rev`), its user
//! properties and its change state. Edge pods also hold their endpoints.
//! Pods are shared through `PodRef` and mutated through `&self`; callers must
//! not use one pod from several threads (pods are `!Send`).

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::trace;

use crate::driver::{DISTANCE_PARAMETER, FROM, ID, KEY, LABEL, Persisted, REV, TO, WireRecord};
use crate::endpoint::Endpoint;
use crate::error::{PodError, ToolboxError};
use crate::event::{Event, Lifecycle};
use crate::geo::Coordinates;
use crate::id::DocumentId;
use crate::model::{Model, ModelRef};
use crate::observable::Observer;
use crate::query::Criteria;
use crate::toolbox::Toolbox;

mod edge;
mod vertex;

pub use vertex::Direction;

/// Shared handle to a pod.
pub type PodRef = Rc<Pod>;

/// Attribute names starting with this prefix belong to the server.
pub const RESERVED_PREFIX: char = '_';

const DOCUMENT_RESERVED: &[&str] = &[ID, KEY, REV];
const EDGE_RESERVED: &[&str] = &[ID, KEY, REV, FROM, TO, LABEL];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodKind {
    Document,
    Vertex,
    Edge,
}

impl PodKind {
    /// Fields only reachable through dedicated accessors.
    pub fn reserved_fields(self) -> &'static [&'static str] {
        match self {
            PodKind::Document | PodKind::Vertex => DOCUMENT_RESERVED,
            PodKind::Edge => EDGE_RESERVED,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PodKind::Document => "document",
            PodKind::Vertex => "vertex",
            PodKind::Edge => "edge",
        }
    }
}

/// Distance of a geo query result from the point it was measured against.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceInfo {
    /// Meters.
    pub distance: f64,
    pub reference: Coordinates,
    /// The pod the distance was measured from, if the query started at one.
    pub reference_id: Option<DocumentId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    From,
    To,
}

impl End {
    fn name(self) -> &'static str {
        match self {
            End::From => "from",
            End::To => "to",
        }
    }
}

#[derive(Debug)]
struct PodState {
    id: Option<DocumentId>,
    revision: Option<String>,
    properties: IndexMap<String, Value>,
    is_new: bool,
    changed: bool,
    from: Option<Endpoint>,
    to: Option<Endpoint>,
    distance: Option<DistanceInfo>,
    pending_distance: Option<f64>,
}

impl PodState {
    fn fresh() -> Self {
        PodState {
            id: None,
            revision: None,
            properties: IndexMap::new(),
            is_new: true,
            changed: true,
            from: None,
            to: None,
            distance: None,
            pending_distance: None,
        }
    }

    fn endpoint(&self, end: End) -> &Option<Endpoint> {
        match end {
            End::From => &self.from,
            End::To => &self.to,
        }
    }

    fn endpoint_mut(&mut self, end: End) -> &mut Option<Endpoint> {
        match end {
            End::From => &mut self.from,
            End::To => &mut self.to,
        }
    }
}

pub struct Pod {
    kind: PodKind,
    collection: String,
    toolbox: Rc<Toolbox>,
    state: RefCell<PodState>,
    model: OnceCell<Weak<dyn Model>>,
}

impl Pod {
    /// Creates a fresh pod: new and changed, without identity.
    pub fn new(toolbox: &Rc<Toolbox>, kind: PodKind, collection: impl Into<String>) -> Self {
        Pod {
            kind,
            collection: collection.into(),
            toolbox: Rc::clone(toolbox),
            state: RefCell::new(PodState::fresh()),
            model: OnceCell::new(),
        }
    }

    /// Creates a fresh edge pod with optional endpoints.
    pub fn new_edge(
        toolbox: &Rc<Toolbox>,
        collection: impl Into<String>,
        from: Option<Endpoint>,
        to: Option<Endpoint>,
    ) -> Self {
        let pod = Pod::new(toolbox, PodKind::Edge, collection);
        {
            let mut state = pod.state.borrow_mut();
            state.from = from;
            state.to = to;
        }
        pod
    }

    /// Creates a pod hydrated from a wire record.
    pub fn from_wire(
        toolbox: &Rc<Toolbox>,
        kind: PodKind,
        collection: impl Into<String>,
        record: &WireRecord,
    ) -> Result<Self, PodError> {
        let pod = Pod::new(toolbox, kind, collection);
        pod.load_from_wire(record)?;
        Ok(pod)
    }

    pub fn kind(&self) -> PodKind {
        self.kind
    }

    /// The collection of the id, or the collection the pod was created for.
    pub fn collection(&self) -> String {
        match &self.state.borrow().id {
            Some(id) => id.collection().to_string(),
            None => self.collection.clone(),
        }
    }

    pub fn toolbox(&self) -> &Rc<Toolbox> {
        &self.toolbox
    }

    pub fn id(&self) -> Option<DocumentId> {
        self.state.borrow().id.clone()
    }

    pub fn key(&self) -> Option<String> {
        self.state.borrow().id.as_ref().map(|id| id.key().to_string())
    }

    pub fn revision(&self) -> Option<String> {
        self.state.borrow().revision.clone()
    }

    pub fn is_new(&self) -> bool {
        self.state.borrow().is_new
    }

    pub fn has_changed(&self) -> bool {
        self.state.borrow().changed
    }

    pub fn is_reserved(&self, field: &str) -> bool {
        field.starts_with(RESERVED_PREFIX)
            || field == DISTANCE_PARAMETER
            || self.kind.reserved_fields().contains(&field)
    }

    fn check_field(&self, field: &str) -> Result<(), PodError> {
        if self.is_reserved(field) {
            return Err(PodError::ReservedField(field.to_string()));
        }
        Ok(())
    }

    pub(crate) fn expect_kind(&self, expected: PodKind) -> Result<(), PodError> {
        if self.kind != expected {
            return Err(PodError::WrongKind {
                expected: expected.name(),
            });
        }
        Ok(())
    }

    pub fn get(&self, field: &str) -> Result<Option<Value>, PodError> {
        self.check_field(field)?;
        Ok(self.state.borrow().properties.get(field).cloned())
    }

    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<(), PodError> {
        self.check_field(field)?;
        let mut state = self.state.borrow_mut();
        state.properties.insert(field.to_string(), value.into());
        state.changed = true;
        Ok(())
    }

    pub fn remove(&self, field: &str) -> Result<Option<Value>, PodError> {
        self.check_field(field)?;
        let mut state = self.state.borrow_mut();
        let removed = state.properties.shift_remove(field);
        if removed.is_some() {
            state.changed = true;
        }
        Ok(removed)
    }

    /// Snapshot of the user properties.
    pub fn properties(&self) -> IndexMap<String, Value> {
        self.state.borrow().properties.clone()
    }

    /// Assigns the id. Fails if an id is already assigned, even when the
    /// new value would be invalid.
    pub fn set_id(&self, id: &str) -> Result<(), PodError> {
        if let Some(current) = &self.state.borrow().id {
            return Err(PodError::IdAlreadySet(current.clone()));
        }
        let parsed = self.toolbox.parse_id(id)?;
        self.state.borrow_mut().id = Some(parsed);
        Ok(())
    }

    pub fn set_revision(&self, revision: impl Into<String>) {
        self.state.borrow_mut().revision = Some(revision.into());
    }

    /// Keys are only ever derived from ids, so this always fails.
    pub fn set_key(&self, _key: &str) -> Result<(), PodError> {
        Err(PodError::KeyNotSettable)
    }

    /// Records the distance of this pod from `reference`, consuming the
    /// distance the query reported for it. Only the first call succeeds.
    pub fn set_distance_info(
        &self,
        reference: Coordinates,
        reference_id: Option<DocumentId>,
    ) -> Result<(), PodError> {
        let mut state = self.state.borrow_mut();
        if state.distance.is_some() {
            return Err(PodError::DistanceAlreadySet);
        }
        let distance = state.pending_distance.take().ok_or(PodError::MissingDistance)?;
        state.distance = Some(DistanceInfo {
            distance,
            reference,
            reference_id,
        });
        Ok(())
    }

    pub fn distance_info(&self) -> Option<DistanceInfo> {
        self.state.borrow().distance.clone()
    }

    pub fn distance(&self) -> Option<f64> {
        self.state.borrow().distance.as_ref().map(|d| d.distance)
    }

    pub fn reference_coordinates(&self) -> Option<Coordinates> {
        self.state.borrow().distance.as_ref().map(|d| d.reference)
    }

    pub fn reference_id(&self) -> Option<DocumentId> {
        self.state
            .borrow()
            .distance
            .as_ref()
            .and_then(|d| d.reference_id.clone())
    }

    /// Loads the pod the distance was measured from. Performs a fetch.
    pub fn reference_pod(&self) -> Result<Option<ModelRef>, ToolboxError> {
        match self.reference_id() {
            Some(id) => self.toolbox.pods().load_by_id(&id),
            None => Ok(None),
        }
    }

    /// Reads this pod's position from the geo-indexed field(s) of its
    /// collection. `None` if the collection has no geo index or the pod
    /// lacks the fields.
    pub fn coordinates(&self) -> Result<Option<Coordinates>, ToolboxError> {
        let Some(fields) = self.toolbox.metadata().geo_fields(&self.collection())? else {
            return Ok(None);
        };
        let state = self.state.borrow();
        Ok(fields.extract(|name| state.properties.get(name)))
    }

    /// Detaches the pod from its persisted identity, keeping properties.
    /// The pod is new and changed afterwards, so storing it inserts a fresh
    /// record.
    pub fn reset_meta(&self) {
        let mut state = self.state.borrow_mut();
        state.id = None;
        state.revision = None;
        state.is_new = true;
        state.changed = true;
    }

    fn push_endpoints(&self, state: &PodState, record: &mut WireRecord) {
        if self.kind != PodKind::Edge {
            return;
        }
        for (name, endpoint) in [(FROM, &state.from), (TO, &state.to)] {
            if let Some(id) = endpoint.as_ref().and_then(Endpoint::id) {
                record.insert(name.to_string(), Value::String(id.to_string()));
            }
        }
    }

    fn push_properties(state: &PodState, record: &mut WireRecord) {
        for (name, value) in &state.properties {
            record.insert(name.clone(), value.clone());
        }
    }

    /// Full wire representation: `_id`, `_key`, `_rev`, edge endpoints and
    /// user properties.
    pub fn to_wire_format(&self) -> WireRecord {
        let state = self.state.borrow();
        let mut record = WireRecord::new();
        if let Some(id) = &state.id {
            record.insert(ID.to_string(), Value::String(id.to_string()));
            record.insert(KEY.to_string(), Value::String(id.key().to_string()));
        }
        if let Some(revision) = &state.revision {
            record.insert(REV.to_string(), Value::String(revision.clone()));
        }
        self.push_endpoints(&state, &mut record);
        Self::push_properties(&state, &mut record);
        record
    }

    /// Wire representation without `_id`/`_key`, for writes whose target is
    /// given separately.
    pub fn to_transaction_wire_format(&self) -> WireRecord {
        let state = self.state.borrow();
        let mut record = WireRecord::new();
        if let Some(revision) = &state.revision {
            record.insert(REV.to_string(), Value::String(revision.clone()));
        }
        self.push_endpoints(&state, &mut record);
        Self::push_properties(&state, &mut record);
        record
    }

    /// The body handed to `Transport::persist`: `_key` (if assigned), `_rev`,
    /// endpoints and properties. Edges must have both endpoint ids.
    pub fn to_driver_format(&self) -> Result<WireRecord, PodError> {
        let state = self.state.borrow();
        let mut record = WireRecord::new();
        if let Some(id) = &state.id {
            record.insert(KEY.to_string(), Value::String(id.key().to_string()));
        }
        if let Some(revision) = &state.revision {
            record.insert(REV.to_string(), Value::String(revision.clone()));
        }
        if self.kind == PodKind::Edge {
            for end in [End::From, End::To] {
                let id = state
                    .endpoint(end)
                    .as_ref()
                    .and_then(Endpoint::id)
                    .ok_or(PodError::MissingEndpoint(end.name()))?;
                let name = match end {
                    End::From => FROM,
                    End::To => TO,
                };
                record.insert(name.to_string(), Value::String(id.to_string()));
            }
        }
        Self::push_properties(&state, &mut record);
        Ok(record)
    }

    /// Hydrates identity, revision, endpoints and properties from a wire
    /// record. The pod is afterwards neither new nor changed.
    pub fn load_from_wire(&self, record: &WireRecord) -> Result<(), PodError> {
        let id = match record.get(ID) {
            Some(Value::String(raw)) => Some(DocumentId::parse(raw)?),
            Some(Value::Null) | None => match record.get(KEY) {
                Some(Value::String(key)) => Some(DocumentId::new(self.collection(), key.clone())?),
                _ => None,
            },
            Some(other) => return Err(PodError::InvalidRecord(format!("{ID} must be a string, got {other}"))),
        };
        let revision = optional_string(record, REV)?;
        let (from, to) = if self.kind == PodKind::Edge {
            (read_endpoint(record, FROM)?, read_endpoint(record, TO)?)
        } else {
            (None, None)
        };
        let pending_distance = match record.get(DISTANCE_PARAMETER) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_f64().ok_or_else(|| {
                PodError::InvalidRecord(format!("{DISTANCE_PARAMETER} must be numeric, got {value}"))
            })?),
        };
        let properties: IndexMap<String, Value> = record
            .iter()
            .filter(|(name, _)| !name.starts_with(RESERVED_PREFIX) && name.as_str() != DISTANCE_PARAMETER)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let mut state = self.state.borrow_mut();
        if let (Some(current), Some(incoming)) = (&state.id, &id) {
            if current != incoming {
                return Err(PodError::IdAlreadySet(current.clone()));
            }
        }
        if id.is_some() {
            state.id = id;
        }
        state.revision = revision;
        state.properties = properties;
        if self.kind == PodKind::Edge {
            state.from = from;
            state.to = to;
        }
        state.pending_distance = pending_distance;
        state.is_new = false;
        state.changed = false;
        Ok(())
    }

    /// Like `load_from_wire` for an arbitrary JSON value, which must be an
    /// object.
    pub fn load_from_raw_map(&self, raw: &Value) -> Result<(), PodError> {
        match raw {
            Value::Object(record) => self.load_from_wire(record),
            other => Err(PodError::InvalidRecord(format!("expected an object, got {other}"))),
        }
    }

    /// Binds the model notified of this pod's lifecycle. Only the first call
    /// succeeds.
    pub fn load_model(&self, model: &ModelRef) -> Result<(), PodError> {
        self.model
            .set(Rc::downgrade(model))
            .map_err(|_| PodError::ModelAlreadyBound)
    }

    /// The bound model, while it is alive.
    pub fn model(&self) -> Option<ModelRef> {
        self.model.get().and_then(Weak::upgrade)
    }

    /// Geo search in this pod's collection around this pod, nearest first.
    pub fn near(&self, criteria: &Criteria, limit: usize) -> Result<Vec<ModelRef>, ToolboxError> {
        let (point, criteria) = self.geo_origin(criteria)?;
        self.toolbox
            .finder()
            .near_reference(&self.collection(), point, &criteria, limit, self.id())
    }

    /// Geo search in this pod's collection for pods within `radius` meters.
    pub fn within(&self, radius: f64, criteria: &Criteria) -> Result<Vec<ModelRef>, ToolboxError> {
        let (point, criteria) = self.geo_origin(criteria)?;
        self.toolbox
            .finder()
            .within_reference(&self.collection(), point, radius, &criteria, self.id())
    }

    fn geo_origin(&self, criteria: &Criteria) -> Result<(Coordinates, Criteria), ToolboxError> {
        let point = self.coordinates()?.ok_or(PodError::NoCoordinates)?;
        let criteria = match self.id() {
            Some(id) => criteria.clone().ne(ID, id.to_string()),
            None => criteria.clone(),
        };
        Ok((point, criteria))
    }

    /// A fresh pod of the same kind and collection with a copy of the user
    /// properties (and endpoints, for edges).
    pub(crate) fn duplicate(&self) -> Pod {
        let copy = Pod::new(&self.toolbox, self.kind, self.collection());
        {
            let source = self.state.borrow();
            let mut target = copy.state.borrow_mut();
            target.properties = source.properties.clone();
            target.from = source.from.clone();
            target.to = source.to.clone();
        }
        copy
    }

    pub(crate) fn confirm_saved(&self, persisted: &Persisted) {
        let mut state = self.state.borrow_mut();
        if state.id.is_none() {
            state.id = Some(persisted.id.clone());
        }
        state.revision = Some(persisted.revision.clone());
        state.is_new = false;
        state.changed = false;
    }

    pub(crate) fn confirm_deleted(&self) {
        let mut state = self.state.borrow_mut();
        state.revision = None;
        state.is_new = true;
        state.changed = true;
    }
}

fn optional_string(record: &WireRecord, name: &str) -> Result<Option<String>, PodError> {
    match record.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(PodError::InvalidRecord(format!("{name} must be a string, got {other}"))),
    }
}

fn read_endpoint(record: &WireRecord, name: &str) -> Result<Option<Endpoint>, PodError> {
    match optional_string(record, name)? {
        Some(raw) => Ok(Some(Endpoint::Unresolved(DocumentId::parse(&raw)?))),
        None => Ok(None),
    }
}

impl Observer<PodRef> for Pod {
    /// Forwards lifecycle events about this very pod to the bound model.
    fn on_event(&self, event: &Event<PodRef>) -> Result<(), ToolboxError> {
        if !std::ptr::eq(self, Rc::as_ptr(event.payload())) {
            return Ok(());
        }
        let Some(lifecycle) = Lifecycle::from_name(event.name()) else {
            return Ok(());
        };
        let Some(model) = self.model() else {
            trace!(event = event.name(), "no live model bound, event ignored");
            return Ok(());
        };
        let outcome = match lifecycle {
            Lifecycle::AfterDispense => model.after_dispense(),
            Lifecycle::AfterOpen => model.after_open(),
            Lifecycle::BeforeStore => model.before_store(),
            Lifecycle::AfterStore => model.after_store(),
            Lifecycle::BeforeDelete => model.before_delete(),
            Lifecycle::AfterDelete => model.after_delete(),
        };
        outcome.map_err(|source| ToolboxError::Hook {
            event: event.name().to_string(),
            source,
        })
    }
}

impl fmt::Debug for Pod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Pod")
            .field("kind", &self.kind)
            .field("collection", &self.collection)
            .field("id", &state.id)
            .field("revision", &state.revision)
            .field("is_new", &state.is_new)
            .field("changed", &state.changed)
            .field("properties", &state.properties)
            .finish()
    }
}

#[cfg(test)]
mod tests;
