//! Podium maps the records of a document/graph database onto in-process
//! pods and the models wrapped around them.
//!
//! Core concepts:
//! - **Pod**: a record's identity (`collection/key` id, revision), its user
//!   properties and change state. Comes as document, vertex or edge.
//! - **Model**: a user type bound 1:1 to a pod, notified of lifecycle events
//!   (`after_dispense`, `after_open`, `before_store`, `after_store`,
//!   `before_delete`, `after_delete`).
//! - **Endpoint**: an edge's reference to a vertex, either a live model or an
//!   id resolved on first access.
//! - **Toolbox**: the connection context. Holds the transport, query engine
//!   and metadata collaborators, the model formatter and the event bus.
//! - **PodManager** / **Finder**: create, store, delete, load and query
//!   models through a toolbox.
//!
//! # Example
//!
//! ```
//! use podium_core::{Bound, Toolbox, ToolboxConfig};
//!
//! let toolbox = Toolbox::in_memory(ToolboxConfig::new("blog"))?;
//! let pods = toolbox.pods();
//!
//! let post = pods.dispense("posts")?;
//! post.pod()?.set("title", "Hello")?;
//! assert!(post.pod()?.is_new());
//!
//! let id = pods.store(&post)?;
//! assert!(!post.pod()?.has_changed());
//!
//! let loaded = pods.load_by_id(&id)?.expect("stored above");
//! assert_eq!(loaded.pod()?.get("title")?, Some("Hello".into()));
//! # Ok::<(), podium_core::ToolboxError>(())
//! ```
//!
//! Models are plain structs embedding a `ModelBase`:
//!
//! ```
//! use podium_core::{model, Bound};
//!
//! #[model]
//! struct Person {
//!     base: podium_core::ModelBase,
//! }
//!
//! impl Person {
//!     fn name(&self) -> Option<String> {
//!         let value = self.pod().ok()?.get("name").ok()??;
//!         value.as_str().map(str::to_string)
//!     }
//! }
//! ```

mod config;
mod driver;
mod endpoint;
mod error;
mod eval;
mod event;
mod finder;
mod formatter;
mod geo;
mod id;
mod manager;
mod memory;
mod model;
mod observable;
mod pod;
mod query;
mod toolbox;

pub use config::{GraphConfig, ToolboxConfig};
pub use driver::{
    CollectionMetadata, DISTANCE_PARAMETER, Persisted, QueryEngine, QueryKind, TraceEvent, TraceHook,
    Transport, WireRecord, Write,
};
pub use endpoint::Endpoint;
pub use error::{HookError, PodError, RemoteError, ToolboxError};
pub use eval::{ERROR_GEO_INDEX_MISSING, ERROR_QUERY_PARSE};
pub use event::{Event, EventNames, Lifecycle};
pub use finder::Finder;
pub use formatter::{DefaultFormatter, ModelFormatter, RegistryFormatter};
pub use geo::{Coordinates, EARTH_RADIUS_METERS, GeoFields};
pub use id::{DocumentId, ID_SEPARATOR};
pub use manager::PodManager;
pub use memory::{ERROR_DOCUMENT_KEY_BAD, ERROR_DOCUMENT_NOT_FOUND, ERROR_UNIQUE_CONSTRAINT, MemoryDatabase};
pub use model::{Bound, GenericModel, Model, ModelBase, ModelConstructor, ModelRef, constructor};
pub use observable::{Observable, Observer};
pub use pod::{Direction, DistanceInfo, Pod, PodKind, PodRef, RESERVED_PREFIX};
pub use query::{Condition, Criteria, DEFAULT_PLACEHOLDER, Params, Query};
pub use toolbox::{GraphInfo, Toolbox, ToolboxBuilder};

/// Wire attribute names.
pub mod fields {
    pub use crate::driver::{FROM, ID, KEY, LABEL, REV, TO};
}

/// Query evaluation for collaborators that keep records in process.
pub mod local {
    pub use crate::eval::{filter, near, search, within};
}

#[cfg(feature = "derive")]
pub use podium_derive::{Bound, model};
