//! Contracts of the external collaborators a toolbox talks to.
//!
//! Collaborators exchange wire records: JSON objects carrying the server's
//! system attributes (`_id`, `_key`, `_rev`, and `_from`/`_to` for edges)
//! next to the user attributes.

use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::error::RemoteError;
use crate::geo::{Coordinates, GeoFields};
use crate::id::DocumentId;
use crate::query::Query;

/// A record in the server's representation.
pub type WireRecord = Map<String, Value>;

pub const ID: &str = "_id";
pub const KEY: &str = "_key";
pub const REV: &str = "_rev";
pub const FROM: &str = "_from";
pub const TO: &str = "_to";
pub const LABEL: &str = "$label";

/// Attribute geo queries use to report each result's distance (in meters).
pub const DISTANCE_PARAMETER: &str = "podium_distance_parameter";

/// How `Transport::persist` writes a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Write {
    /// Create a new document, failing if the key is taken.
    Insert,
    /// Replace an existing document.
    Replace,
}

/// Identity assigned by the server after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persisted {
    pub id: DocumentId,
    pub revision: String,
}

/// Document-level access to the server.
///
/// Implementations report server failures as `RemoteError` with the
/// server's own code and message.
pub trait Transport {
    /// Writes a record into `collection`. A `_key` attribute in the record
    /// selects the target key; without one, inserts get a generated key.
    fn persist(&self, collection: &str, record: &WireRecord, write: Write) -> Result<Persisted, RemoteError>;

    /// Fetches a record, or `None` if it does not exist.
    fn fetch(&self, collection: &str, key: &str) -> Result<Option<WireRecord>, RemoteError>;

    /// Removes a record.
    fn remove(&self, id: &DocumentId) -> Result<(), RemoteError>;
}

/// Filtered reads, geo proximity and full-text search.
pub trait QueryEngine {
    fn run_filtered(&self, query: &Query) -> Result<Vec<WireRecord>, RemoteError>;

    /// Up to `limit` records closest to `point`, nearest first, each carrying
    /// its distance under `DISTANCE_PARAMETER`.
    fn run_near(&self, query: &Query, point: Coordinates, limit: usize) -> Result<Vec<WireRecord>, RemoteError>;

    /// Records within `radius` meters of `point`, nearest first, each
    /// carrying its distance under `DISTANCE_PARAMETER`.
    fn run_within(&self, query: &Query, point: Coordinates, radius: f64) -> Result<Vec<WireRecord>, RemoteError>;

    /// Records whose `field` contains `term`.
    fn run_search(&self, query: &Query, field: &str, term: &str) -> Result<Vec<WireRecord>, RemoteError>;
}

/// Index information about collections.
pub trait CollectionMetadata {
    /// Returns the geo-indexed attribute(s) of `collection`, if any.
    fn geo_fields(&self, collection: &str) -> Result<Option<GeoFields>, RemoteError>;
}

/// A single collaborator call, reported to an injected trace hook.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    Persist { collection: String, write: Write },
    Fetch { collection: String, key: String },
    Remove { id: DocumentId },
    Query { collection: String, kind: QueryKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Filtered,
    Near,
    Within,
    Search,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Persist { collection, write } => write!(f, "persist {collection} ({write:?})"),
            TraceEvent::Fetch { collection, key } => write!(f, "fetch {collection}/{key}"),
            TraceEvent::Remove { id } => write!(f, "remove {id}"),
            TraceEvent::Query { collection, kind } => write!(f, "query {collection} ({kind:?})"),
        }
    }
}

/// Callback receiving every collaborator call. Passed to a collaborator at
/// construction.
pub type TraceHook = Rc<dyn Fn(&TraceEvent)>;
