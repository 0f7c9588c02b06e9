use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::error::{PodError, ToolboxError};
use crate::id::DocumentId;
use crate::model::ModelRef;
use crate::pod::PodKind;
use crate::toolbox::Toolbox;

/// One end of an edge.
///
/// Endpoints exist in two states:
/// - **Unresolved**: only the vertex id is known (after loading from the server)
/// - **Resolved**: a live model is held (after `resolve`, or when set directly)
#[derive(Clone)]
pub enum Endpoint {
    Unresolved(DocumentId),
    Resolved(ModelRef),
}

impl Endpoint {
    /// The vertex id. For a resolved endpoint this is the model's pod id,
    /// which is `None` until that vertex is stored.
    pub fn id(&self) -> Option<DocumentId> {
        match self {
            Endpoint::Unresolved(id) => Some(id.clone()),
            Endpoint::Resolved(model) => model.pod().ok().and_then(|pod| pod.id()),
        }
    }

    pub fn key(&self) -> Option<String> {
        self.id().map(|id| id.key().to_string())
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Endpoint::Resolved(_))
    }

    pub fn model(&self) -> Option<&ModelRef> {
        match self {
            Endpoint::Unresolved(_) => None,
            Endpoint::Resolved(model) => Some(model),
        }
    }

    /// Models given as endpoints must be bound to a vertex pod. Ids are
    /// taken as they are.
    pub(crate) fn check_vertex(&self) -> Result<(), PodError> {
        match self {
            Endpoint::Unresolved(_) => Ok(()),
            Endpoint::Resolved(model) => model.pod()?.expect_kind(PodKind::Vertex),
        }
    }

    /// Returns a resolved endpoint, fetching the vertex through `toolbox`
    /// when only its id is known. This is a blocking remote call.
    pub fn resolve(&self, toolbox: &Rc<Toolbox>) -> Result<Endpoint, ToolboxError> {
        match self {
            Endpoint::Resolved(_) => Ok(self.clone()),
            Endpoint::Unresolved(id) => {
                trace!(%id, "resolving endpoint");
                let model = toolbox
                    .pods()
                    .load_by_id(id)?
                    .ok_or_else(|| ToolboxError::NotFound(id.clone()))?;
                Ok(Endpoint::Resolved(model))
            }
        }
    }
}

impl From<DocumentId> for Endpoint {
    fn from(id: DocumentId) -> Self {
        Endpoint::Unresolved(id)
    }
}

impl From<ModelRef> for Endpoint {
    fn from(model: ModelRef) -> Self {
        Endpoint::Resolved(model)
    }
}

impl From<&ModelRef> for Endpoint {
    fn from(model: &ModelRef) -> Self {
        Endpoint::Resolved(Rc::clone(model))
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unresolved(id) => f.debug_tuple("Unresolved").field(id).finish(),
            Endpoint::Resolved(model) => f
                .debug_tuple("Resolved")
                .field(&model.pod().ok().and_then(|pod| pod.id()))
                .finish(),
        }
    }
}
