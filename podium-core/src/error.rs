use thiserror::Error;

use crate::id::DocumentId;

/// Errors raised by the pod contract itself. None of them leave a pod
/// partially mutated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PodError {
    #[error("id already set to {0}")]
    IdAlreadySet(DocumentId),
    #[error("malformed id {0:?}, expected collection/key")]
    MalformedId(String),
    #[error("the key is derived from the id and cannot be set directly")]
    KeyNotSettable,
    #[error("distance information already set")]
    DistanceAlreadySet,
    #[error("no distance parameter present on this pod")]
    MissingDistance,
    #[error("a model is already bound to this pod")]
    ModelAlreadyBound,
    #[error("a pod is already bound to this model")]
    PodAlreadyBound,
    #[error("no pod is bound to this model")]
    Unbound,
    #[error("{0:?} is a reserved field")]
    ReservedField(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("pod has not been persisted")]
    NotPersisted,
    #[error("no coordinates available for this pod")]
    NoCoordinates,
    #[error("edge is missing its {0} vertex")]
    MissingEndpoint(&'static str),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("operation requires a {expected} pod")]
    WrongKind { expected: &'static str },
}

/// An error reported by the server (or a collaborator standing in for it).
///
/// The code and message are preserved exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("server error {code}: {message}")]
pub struct RemoteError {
    pub code: i64,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        RemoteError {
            code,
            message: message.into(),
        }
    }
}

/// Error type returned by model hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by toolbox operations (manager, finder, lazy resolution).
#[derive(Debug, Error)]
pub enum ToolboxError {
    #[error(transparent)]
    Pod(#[from] PodError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("{event} hook failed: {source}")]
    Hook {
        event: String,
        #[source]
        source: HookError,
    },
    #[error("document {0} not found")]
    NotFound(DocumentId),
    #[error("pod belongs to a different toolbox")]
    ForeignPod,
    #[error("toolbox {0:?} has no graph configured")]
    NotGraph(String),
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolboxError {
    /// Returns the server error code when this error came from a collaborator.
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            ToolboxError::Remote(err) => Some(err.code),
            _ => None,
        }
    }
}
