//! RocksDB-backed database for Podium.
//!
//! Records are stored as JSON under `doc:{collection}/{key}`. Key and
//! revision counters and geo index definitions live next to them, so a
//! reopened database continues where it left off.

use std::cell::Cell;
use std::path::Path;

use podium_core::fields::{ID, KEY, REV};
use podium_core::local;
use podium_core::{
    CollectionMetadata, Coordinates, DocumentId, ERROR_DOCUMENT_KEY_BAD, ERROR_DOCUMENT_NOT_FOUND,
    ERROR_UNIQUE_CONSTRAINT, GeoFields, Persisted, Query, QueryEngine, QueryKind, RemoteError, ToolboxConfig,
    TraceEvent, TraceHook, Transport, WireRecord, Write,
};
use rocksdb::{DB, Direction, IteratorMode, Options};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};

/// Server code for an internal failure.
pub const ERROR_INTERNAL: i64 = 4;

const DOCUMENT_PREFIX: &str = "doc:";
const GEO_PREFIX: &str = "geo:";
const LAST_KEY: &[u8] = b"meta:last_key";
const LAST_REVISION: &[u8] = b"meta:last_revision";

#[derive(Debug, Error)]
pub enum RocksError {
    #[error("RocksDB error: {0}")]
    Rocks(#[from] rocksdb::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("toolbox {0:?} has no store_path configured")]
    MissingPath(String),
}

impl From<RocksError> for RemoteError {
    fn from(err: RocksError) -> Self {
        RemoteError::new(ERROR_INTERNAL, err.to_string())
    }
}

/// A persistent database backed by RocksDB, playing all three collaborator
/// roles.
pub struct RocksDatabase {
    db: DB,
    fetches: Cell<usize>,
    trace: Option<TraceHook>,
}

impl RocksDatabase {
    /// Opens a RocksDB database at the given path.
    ///
    /// Creates the database if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RocksError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened rocks database");
        Ok(Self {
            db,
            fetches: Cell::new(0),
            trace: None,
        })
    }

    /// Opens the database at the config's `store_path`.
    pub fn open_config(config: &ToolboxConfig) -> Result<Self, RocksError> {
        let path = config
            .store_path
            .as_ref()
            .ok_or_else(|| RocksError::MissingPath(config.name.clone()))?;
        Self::open(path)
    }

    /// Reports every collaborator call to `hook`.
    pub fn with_trace(mut self, hook: TraceHook) -> Self {
        self.trace = Some(hook);
        self
    }

    /// Declares the geo-indexed attribute(s) of `collection`.
    pub fn ensure_geo_index(&self, collection: &str, fields: &GeoFields) -> Result<(), RocksError> {
        let key = format!("{GEO_PREFIX}{collection}");
        self.db.put(key, serde_json::to_vec(fields)?)?;
        Ok(())
    }

    /// Number of `fetch` calls served by this handle.
    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }

    /// Number of records in `collection`.
    pub fn len(&self, collection: &str) -> Result<usize, RocksError> {
        Ok(self.scan(collection)?.len())
    }

    fn record(&self, event: TraceEvent) {
        trace!(%event, "rocks database call");
        if let Some(hook) = &self.trace {
            hook(&event);
        }
    }

    fn document_key(collection: &str, key: &str) -> String {
        format!("{DOCUMENT_PREFIX}{collection}/{key}")
    }

    fn decode(key: &[u8], bytes: &[u8]) -> Result<WireRecord, RocksError> {
        match serde_json::from_slice(bytes)? {
            Value::Object(record) => Ok(record),
            other => Err(RocksError::Corrupt {
                key: String::from_utf8_lossy(key).into_owned(),
                reason: format!("expected an object, got {other}"),
            }),
        }
    }

    fn read(&self, collection: &str, key: &str) -> Result<Option<WireRecord>, RocksError> {
        let db_key = Self::document_key(collection, key);
        match self.db.get(&db_key)? {
            Some(bytes) => Ok(Some(Self::decode(db_key.as_bytes(), &bytes)?)),
            None => Ok(None),
        }
    }

    fn scan(&self, collection: &str) -> Result<Vec<WireRecord>, RocksError> {
        let prefix = format!("{DOCUMENT_PREFIX}{collection}/");
        let mut records = Vec::new();
        for entry in self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward))
        {
            let (key, value) = entry?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            records.push(Self::decode(&key, &value)?);
        }
        Ok(records)
    }

    fn next_counter(&self, name: &[u8]) -> Result<u64, RocksError> {
        let current = match self.db.get(name)? {
            Some(bytes) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|text| text.parse::<u64>().ok())
                .ok_or_else(|| RocksError::Corrupt {
                    key: String::from_utf8_lossy(name).into_owned(),
                    reason: "counter is not a number".to_string(),
                })?,
            None => 0,
        };
        let next = current + 1;
        self.db.put(name, next.to_string())?;
        Ok(next)
    }

    /// Next counter value not already used as a key in `collection`.
    fn generate_key(&self, collection: &str) -> Result<String, RocksError> {
        loop {
            let candidate = self.next_counter(LAST_KEY)?.to_string();
            if self.db.get_pinned(Self::document_key(collection, &candidate))?.is_none() {
                return Ok(candidate);
            }
        }
    }

    fn geo(&self, collection: &str) -> Result<Option<GeoFields>, RocksError> {
        match self.db.get(format!("{GEO_PREFIX}{collection}"))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

fn not_found(what: impl std::fmt::Display) -> RemoteError {
    RemoteError::new(ERROR_DOCUMENT_NOT_FOUND, format!("document not found: {what}"))
}

impl Transport for RocksDatabase {
    fn persist(&self, collection: &str, record: &WireRecord, write: Write) -> Result<Persisted, RemoteError> {
        self.record(TraceEvent::Persist {
            collection: collection.to_string(),
            write,
        });

        let key = match (record.get(KEY), write) {
            (Some(Value::String(key)), _) => key.clone(),
            (None, Write::Insert) => self.generate_key(collection)?,
            (None, Write::Replace) => {
                return Err(RemoteError::new(ERROR_DOCUMENT_KEY_BAD, "replace requires a document key"));
            }
            (Some(other), _) => {
                return Err(RemoteError::new(ERROR_DOCUMENT_KEY_BAD, format!("illegal document key {other}")));
            }
        };
        let id = DocumentId::new(collection, key.clone())
            .map_err(|err| RemoteError::new(ERROR_DOCUMENT_KEY_BAD, err.to_string()))?;

        let db_key = Self::document_key(collection, &key);
        let exists = self.db.get_pinned(&db_key).map_err(RocksError::from)?.is_some();
        match write {
            Write::Insert if exists => {
                return Err(RemoteError::new(
                    ERROR_UNIQUE_CONSTRAINT,
                    format!("unique constraint violated: {id}"),
                ));
            }
            Write::Replace if !exists => return Err(not_found(&id)),
            _ => {}
        }

        let revision = format!("_r{}", self.next_counter(LAST_REVISION)?);
        let mut stored = WireRecord::new();
        stored.insert(ID.to_string(), Value::String(id.to_string()));
        stored.insert(KEY.to_string(), Value::String(key));
        stored.insert(REV.to_string(), Value::String(revision.clone()));
        for (name, value) in record {
            if !matches!(name.as_str(), ID | KEY | REV) {
                stored.insert(name.clone(), value.clone());
            }
        }
        let bytes = serde_json::to_vec(&stored).map_err(RocksError::from)?;
        self.db.put(&db_key, bytes).map_err(RocksError::from)?;

        Ok(Persisted { id, revision })
    }

    fn fetch(&self, collection: &str, key: &str) -> Result<Option<WireRecord>, RemoteError> {
        self.record(TraceEvent::Fetch {
            collection: collection.to_string(),
            key: key.to_string(),
        });
        self.fetches.set(self.fetches.get() + 1);
        Ok(self.read(collection, key)?)
    }

    fn remove(&self, id: &DocumentId) -> Result<(), RemoteError> {
        self.record(TraceEvent::Remove { id: id.clone() });
        let db_key = Self::document_key(id.collection(), id.key());
        if self.db.get_pinned(&db_key).map_err(RocksError::from)?.is_none() {
            return Err(not_found(id));
        }
        self.db.delete(&db_key).map_err(RocksError::from)?;
        Ok(())
    }
}

impl QueryEngine for RocksDatabase {
    fn run_filtered(&self, query: &Query) -> Result<Vec<WireRecord>, RemoteError> {
        self.record(TraceEvent::Query {
            collection: query.collection.clone(),
            kind: QueryKind::Filtered,
        });
        let records = self.scan(&query.collection)?;
        local::filter(query, &records)
    }

    fn run_near(&self, query: &Query, point: Coordinates, limit: usize) -> Result<Vec<WireRecord>, RemoteError> {
        self.record(TraceEvent::Query {
            collection: query.collection.clone(),
            kind: QueryKind::Near,
        });
        let geo = self.geo(&query.collection)?;
        let records = self.scan(&query.collection)?;
        local::near(query, &records, geo.as_ref(), point, limit)
    }

    fn run_within(&self, query: &Query, point: Coordinates, radius: f64) -> Result<Vec<WireRecord>, RemoteError> {
        self.record(TraceEvent::Query {
            collection: query.collection.clone(),
            kind: QueryKind::Within,
        });
        let geo = self.geo(&query.collection)?;
        let records = self.scan(&query.collection)?;
        local::within(query, &records, geo.as_ref(), point, radius)
    }

    fn run_search(&self, query: &Query, field: &str, term: &str) -> Result<Vec<WireRecord>, RemoteError> {
        self.record(TraceEvent::Query {
            collection: query.collection.clone(),
            kind: QueryKind::Search,
        });
        let records = self.scan(&query.collection)?;
        local::search(query, &records, field, term)
    }
}

impl CollectionMetadata for RocksDatabase {
    fn geo_fields(&self, collection: &str) -> Result<Option<GeoFields>, RemoteError> {
        Ok(self.geo(collection)?)
    }
}
