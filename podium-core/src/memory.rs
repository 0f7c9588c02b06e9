use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::trace;

use crate::driver::{
    CollectionMetadata, ID, KEY, Persisted, QueryEngine, QueryKind, REV, TraceEvent, TraceHook, Transport,
    WireRecord, Write,
};
use crate::error::RemoteError;
use crate::eval;
use crate::geo::{Coordinates, GeoFields};
use crate::id::DocumentId;
use crate::query::Query;

/// Server code for a missing document.
pub const ERROR_DOCUMENT_NOT_FOUND: i64 = 1202;
/// Server code for an insert whose key is taken.
pub const ERROR_UNIQUE_CONSTRAINT: i64 = 1210;
/// Server code for an unusable document key.
pub const ERROR_DOCUMENT_KEY_BAD: i64 = 1221;

/// An in-process database playing all three collaborator roles.
///
/// Records are kept per collection in insertion order. Useful for testing
/// and as a reference implementation.
#[derive(Default)]
pub struct MemoryDatabase {
    collections: RefCell<IndexMap<String, IndexMap<String, WireRecord>>>,
    geo_indexes: RefCell<HashMap<String, GeoFields>>,
    last_key: Cell<u64>,
    last_revision: Cell<u64>,
    fetches: Cell<usize>,
    trace: Option<TraceHook>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports every collaborator call to `hook`.
    pub fn with_trace(mut self, hook: TraceHook) -> Self {
        self.trace = Some(hook);
        self
    }

    /// Declares the geo-indexed attribute(s) of `collection`.
    pub fn ensure_geo_index(&self, collection: &str, fields: GeoFields) {
        self.geo_indexes
            .borrow_mut()
            .insert(collection.to_string(), fields);
    }

    /// Number of `fetch` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }

    /// Number of records in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .borrow()
            .get(collection)
            .map_or(0, IndexMap::len)
    }

    fn record(&self, event: TraceEvent) {
        trace!(%event, "memory database call");
        if let Some(hook) = &self.trace {
            hook(&event);
        }
    }

    fn next(counter: &Cell<u64>) -> u64 {
        let value = counter.get() + 1;
        counter.set(value);
        value
    }

    fn records<R>(&self, collection: &str, f: impl FnOnce(&mut dyn Iterator<Item = &WireRecord>) -> R) -> R {
        let collections = self.collections.borrow();
        let mut records = collections.get(collection).into_iter().flat_map(IndexMap::values);
        f(&mut records)
    }

    fn geo_fields_of(&self, collection: &str) -> Option<GeoFields> {
        self.geo_indexes.borrow().get(collection).cloned()
    }
}

impl fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDatabase")
            .field("collections", &self.collections.borrow().len())
            .field("fetches", &self.fetches.get())
            .finish_non_exhaustive()
    }
}

fn not_found(what: impl fmt::Display) -> RemoteError {
    RemoteError::new(ERROR_DOCUMENT_NOT_FOUND, format!("document not found: {what}"))
}

impl Transport for MemoryDatabase {
    fn persist(&self, collection: &str, record: &WireRecord, write: Write) -> Result<Persisted, RemoteError> {
        self.record(TraceEvent::Persist {
            collection: collection.to_string(),
            write,
        });

        let mut collections = self.collections.borrow_mut();
        let documents = collections.entry(collection.to_string()).or_default();
        let key = match (record.get(KEY), write) {
            (Some(Value::String(key)), _) => key.clone(),
            // Generated keys skip over keys callers picked themselves.
            (None, Write::Insert) => loop {
                let candidate = Self::next(&self.last_key).to_string();
                if !documents.contains_key(&candidate) {
                    break candidate;
                }
            },
            (None, Write::Replace) => {
                return Err(RemoteError::new(ERROR_DOCUMENT_KEY_BAD, "replace requires a document key"));
            }
            (Some(other), _) => {
                return Err(RemoteError::new(ERROR_DOCUMENT_KEY_BAD, format!("illegal document key {other}")));
            }
        };
        let id = DocumentId::new(collection, key.clone())
            .map_err(|err| RemoteError::new(ERROR_DOCUMENT_KEY_BAD, err.to_string()))?;

        match write {
            Write::Insert if documents.contains_key(&key) => {
                return Err(RemoteError::new(
                    ERROR_UNIQUE_CONSTRAINT,
                    format!("unique constraint violated: {id}"),
                ));
            }
            Write::Replace if !documents.contains_key(&key) => return Err(not_found(&id)),
            _ => {}
        }

        let revision = format!("_r{}", Self::next(&self.last_revision));
        let mut stored = WireRecord::new();
        stored.insert(ID.to_string(), Value::String(id.to_string()));
        stored.insert(KEY.to_string(), Value::String(key.clone()));
        stored.insert(REV.to_string(), Value::String(revision.clone()));
        for (name, value) in record {
            if !matches!(name.as_str(), ID | KEY | REV) {
                stored.insert(name.clone(), value.clone());
            }
        }
        documents.insert(key, stored);

        Ok(Persisted { id, revision })
    }

    fn fetch(&self, collection: &str, key: &str) -> Result<Option<WireRecord>, RemoteError> {
        self.record(TraceEvent::Fetch {
            collection: collection.to_string(),
            key: key.to_string(),
        });
        self.fetches.set(self.fetches.get() + 1);
        Ok(self
            .collections
            .borrow()
            .get(collection)
            .and_then(|documents| documents.get(key))
            .cloned())
    }

    fn remove(&self, id: &DocumentId) -> Result<(), RemoteError> {
        self.record(TraceEvent::Remove { id: id.clone() });
        self.collections
            .borrow_mut()
            .get_mut(id.collection())
            .and_then(|documents| documents.shift_remove(id.key()))
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }
}

impl QueryEngine for MemoryDatabase {
    fn run_filtered(&self, query: &Query) -> Result<Vec<WireRecord>, RemoteError> {
        self.record(TraceEvent::Query {
            collection: query.collection.clone(),
            kind: QueryKind::Filtered,
        });
        self.records(&query.collection, |records| eval::filter(query, records))
    }

    fn run_near(&self, query: &Query, point: Coordinates, limit: usize) -> Result<Vec<WireRecord>, RemoteError> {
        self.record(TraceEvent::Query {
            collection: query.collection.clone(),
            kind: QueryKind::Near,
        });
        let geo = self.geo_fields_of(&query.collection);
        self.records(&query.collection, |records| {
            eval::near(query, records, geo.as_ref(), point, limit)
        })
    }

    fn run_within(&self, query: &Query, point: Coordinates, radius: f64) -> Result<Vec<WireRecord>, RemoteError> {
        self.record(TraceEvent::Query {
            collection: query.collection.clone(),
            kind: QueryKind::Within,
        });
        let geo = self.geo_fields_of(&query.collection);
        self.records(&query.collection, |records| {
            eval::within(query, records, geo.as_ref(), point, radius)
        })
    }

    fn run_search(&self, query: &Query, field: &str, term: &str) -> Result<Vec<WireRecord>, RemoteError> {
        self.record(TraceEvent::Query {
            collection: query.collection.clone(),
            kind: QueryKind::Search,
        });
        self.records(&query.collection, |records| eval::search(query, records, field, term))
    }
}

impl CollectionMetadata for MemoryDatabase {
    fn geo_fields(&self, collection: &str) -> Result<Option<GeoFields>, RemoteError> {
        Ok(self.geo_fields_of(collection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Criteria;
    use serde_json::json;
    use std::rc::Rc;

    fn body(value: Value) -> WireRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn insert_generates_key_and_revision() {
        let db = MemoryDatabase::new();
        let persisted = db.persist("notes", &body(json!({"title": "a"})), Write::Insert).unwrap();
        assert_eq!(persisted.id.collection(), "notes");

        let stored = db.fetch("notes", persisted.id.key()).unwrap().unwrap();
        assert_eq!(stored.get(ID), Some(&json!(persisted.id.to_string())));
        assert_eq!(stored.get(REV), Some(&json!(persisted.revision)));
        assert_eq!(stored.get("title"), Some(&json!("a")));
        assert_eq!(db.fetch_count(), 1);
    }

    #[test]
    fn insert_existing_key_fails() {
        let db = MemoryDatabase::new();
        let record = body(json!({"_key": "k"}));
        db.persist("notes", &record, Write::Insert).unwrap();
        let err = db.persist("notes", &record, Write::Insert).unwrap_err();
        assert_eq!(err.code, ERROR_UNIQUE_CONSTRAINT);
    }

    #[test]
    fn generated_keys_skip_taken_keys() {
        let db = MemoryDatabase::new();
        db.persist("notes", &body(json!({"_key": "1"})), Write::Insert).unwrap();
        db.persist("notes", &body(json!({"_key": "2"})), Write::Insert).unwrap();

        let persisted = db.persist("notes", &WireRecord::new(), Write::Insert).unwrap();
        assert_eq!(persisted.id.key(), "3");
        assert_eq!(db.len("notes"), 3);
    }

    #[test]
    fn replace_missing_fails() {
        let db = MemoryDatabase::new();
        let err = db
            .persist("notes", &body(json!({"_key": "k"})), Write::Replace)
            .unwrap_err();
        assert_eq!(err.code, ERROR_DOCUMENT_NOT_FOUND);
    }

    #[test]
    fn remove_and_remove_again() {
        let db = MemoryDatabase::new();
        let persisted = db.persist("notes", &WireRecord::new(), Write::Insert).unwrap();
        db.remove(&persisted.id).unwrap();
        assert_eq!(db.len("notes"), 0);
        assert_eq!(db.remove(&persisted.id).unwrap_err().code, ERROR_DOCUMENT_NOT_FOUND);
    }

    #[test]
    fn near_without_geo_index_fails() {
        let db = MemoryDatabase::new();
        let err = db
            .run_near(&Query::new("places", Criteria::new()), Coordinates::new(0.0, 0.0), 1)
            .unwrap_err();
        assert_eq!(err.code, eval::ERROR_GEO_INDEX_MISSING);
    }

    #[test]
    fn trace_hook_sees_every_call() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let db = MemoryDatabase::new().with_trace(Rc::new(move |event: &TraceEvent| {
            sink.borrow_mut().push(event.to_string());
        }));

        let persisted = db.persist("notes", &WireRecord::new(), Write::Insert).unwrap();
        db.fetch("notes", persisted.id.key()).unwrap();
        db.run_filtered(&Query::new("notes", Criteria::new())).unwrap();

        assert_eq!(
            *seen.borrow(),
            ["persist notes (Insert)", "fetch notes/1", "query notes (Filtered)"]
        );
    }
}
