use serde_json::Value;
use tracing::debug;

use super::{End, Pod, PodKind};
use crate::driver::LABEL;
use crate::endpoint::Endpoint;
use crate::error::{PodError, ToolboxError};
use crate::id::DocumentId;
use crate::model::ModelRef;

/// Edge-only operations. All of them fail with `PodError::WrongKind` on
/// documents and vertices, and endpoint setters reject models that are not
/// vertices.
impl Pod {
    pub fn set_from(&self, vertex: &ModelRef) -> Result<(), PodError> {
        self.set_endpoint(End::From, Endpoint::from(vertex))
    }

    pub fn set_to(&self, vertex: &ModelRef) -> Result<(), PodError> {
        self.set_endpoint(End::To, Endpoint::from(vertex))
    }

    /// Points the `from` end at a vertex known only by id.
    pub fn set_internal_from(&self, id: &str) -> Result<(), PodError> {
        self.set_endpoint(End::From, Endpoint::Unresolved(DocumentId::parse(id)?))
    }

    pub fn set_internal_to(&self, id: &str) -> Result<(), PodError> {
        self.set_endpoint(End::To, Endpoint::Unresolved(DocumentId::parse(id)?))
    }

    fn set_endpoint(&self, end: End, endpoint: Endpoint) -> Result<(), PodError> {
        self.expect_kind(PodKind::Edge)?;
        endpoint.check_vertex()?;
        let mut state = self.state.borrow_mut();
        *state.endpoint_mut(end) = Some(endpoint);
        state.changed = true;
        Ok(())
    }

    /// The `from` vertex, fetched on first access when only its id is known.
    pub fn from(&self) -> Result<Option<ModelRef>, ToolboxError> {
        self.resolve_endpoint(End::From)
    }

    /// The `to` vertex, fetched on first access when only its id is known.
    pub fn to(&self) -> Result<Option<ModelRef>, ToolboxError> {
        self.resolve_endpoint(End::To)
    }

    fn resolve_endpoint(&self, end: End) -> Result<Option<ModelRef>, ToolboxError> {
        self.expect_kind(PodKind::Edge)?;
        let current = self.state.borrow().endpoint(end).clone();
        let pending = match current {
            None => return Ok(None),
            Some(Endpoint::Resolved(model)) => return Ok(Some(model)),
            Some(Endpoint::Unresolved(id)) => id,
        };

        debug!(end = end.name(), id = %pending, "resolving edge endpoint");
        let resolved = Endpoint::Unresolved(pending.clone()).resolve(&self.toolbox)?;
        let model = resolved.model().cloned();

        let mut state = self.state.borrow_mut();
        let slot = state.endpoint_mut(end);
        // The endpoint may have been replaced while the vertex was loading.
        if matches!(slot, Some(Endpoint::Unresolved(id)) if *id == pending) {
            *slot = Some(resolved);
        }
        Ok(model)
    }

    pub(crate) fn endpoints(&self) -> Vec<Endpoint> {
        let state = self.state.borrow();
        state.from.iter().chain(state.to.iter()).cloned().collect()
    }

    fn endpoint_id(&self, end: End) -> Option<DocumentId> {
        if self.kind != PodKind::Edge {
            return None;
        }
        self.state.borrow().endpoint(end).as_ref().and_then(Endpoint::id)
    }

    pub fn from_id(&self) -> Option<DocumentId> {
        self.endpoint_id(End::From)
    }

    pub fn to_id(&self) -> Option<DocumentId> {
        self.endpoint_id(End::To)
    }

    pub fn from_key(&self) -> Option<String> {
        self.from_id().map(|id| id.key().to_string())
    }

    pub fn to_key(&self) -> Option<String> {
        self.to_id().map(|id| id.key().to_string())
    }

    pub fn set_label(&self, label: impl Into<String>) -> Result<(), PodError> {
        self.expect_kind(PodKind::Edge)?;
        let mut state = self.state.borrow_mut();
        state
            .properties
            .insert(LABEL.to_string(), Value::String(label.into()));
        state.changed = true;
        Ok(())
    }

    pub fn label(&self) -> Option<String> {
        self.state
            .borrow()
            .properties
            .get(LABEL)
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}
