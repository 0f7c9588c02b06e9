use serde_json::Value;
use tracing::debug;

use super::{Pod, PodKind};
use crate::driver::{FROM, ID, LABEL, TO};
use crate::endpoint::Endpoint;
use crate::error::{PodError, ToolboxError};
use crate::id::DocumentId;
use crate::model::ModelRef;
use crate::query::{Criteria, Query};
use crate::toolbox::GraphInfo;

/// Which edges to follow from a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Any,
    Inbound,
    Outbound,
}

impl Direction {
    /// `(own end, other end)` pairs of the edges to follow.
    fn ends(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Direction::Any => &[(TO, FROM), (FROM, TO)],
            Direction::Inbound => &[(TO, FROM)],
            Direction::Outbound => &[(FROM, TO)],
        }
    }
}

/// Vertex-only operations.
impl Pod {
    fn graph(&self) -> Result<&GraphInfo, ToolboxError> {
        self.expect_kind(PodKind::Vertex)?;
        self.toolbox
            .graph()
            .ok_or_else(|| ToolboxError::NotGraph(self.toolbox.name().to_string()))
    }

    fn graph_context(&self) -> Result<(&GraphInfo, DocumentId), ToolboxError> {
        let graph = self.graph()?;
        let id = self.id().ok_or(PodError::NotPersisted)?;
        Ok((graph, id))
    }

    /// Dispenses an unsaved edge from this vertex to `other`, labelled
    /// `label`. Storing the edge stores unsaved endpoints first.
    pub fn relate_to(&self, other: &ModelRef, label: &str) -> Result<ModelRef, ToolboxError> {
        self.graph()?;
        let own = self.model().ok_or(PodError::Unbound)?;
        let edge = self
            .toolbox
            .pods()
            .dispense_edge(Some(Endpoint::from(&own)), Some(Endpoint::from(other)))?;
        edge.pod()?.set_label(label)?;
        Ok(edge)
    }

    pub fn inbound_edges(&self, label: Option<&str>, criteria: &Criteria) -> Result<Vec<ModelRef>, ToolboxError> {
        self.connected_edges(TO, label, criteria)
    }

    pub fn outbound_edges(&self, label: Option<&str>, criteria: &Criteria) -> Result<Vec<ModelRef>, ToolboxError> {
        self.connected_edges(FROM, label, criteria)
    }

    /// Inbound edges followed by outbound edges.
    pub fn edges(&self, label: Option<&str>, criteria: &Criteria) -> Result<Vec<ModelRef>, ToolboxError> {
        let mut edges = self.inbound_edges(label, criteria)?;
        edges.extend(self.outbound_edges(label, criteria)?);
        Ok(edges)
    }

    fn connected_edges(
        &self,
        own_end: &str,
        label: Option<&str>,
        criteria: &Criteria,
    ) -> Result<Vec<ModelRef>, ToolboxError> {
        let (graph, id) = self.graph_context()?;
        let mut criteria = criteria.clone().eq(own_end, id.to_string());
        if let Some(label) = label {
            criteria = criteria.eq(LABEL, label);
        }
        self.toolbox.finder().find(&graph.edge_collection, &criteria)
    }

    /// Vertices one hop away in `direction`, filtered by `criteria`.
    pub fn neighbours(&self, direction: Direction, criteria: &Criteria) -> Result<Vec<ModelRef>, ToolboxError> {
        let (graph, id) = self.graph_context()?;
        let own = Value::String(id.to_string());

        let mut adjacent: Vec<Value> = Vec::new();
        for (own_end, other_end) in direction.ends() {
            let query = Query::new(&graph.edge_collection, Criteria::new().eq(*own_end, own.clone()));
            for record in self.toolbox.queries().run_filtered(&query)? {
                if let Some(other) = record.get(*other_end) {
                    if !adjacent.contains(other) {
                        adjacent.push(other.clone());
                    }
                }
            }
        }
        debug!(%id, ?direction, count = adjacent.len(), "collected neighbour ids");
        if adjacent.is_empty() {
            return Ok(Vec::new());
        }

        let criteria = criteria.clone().is_in(ID, adjacent);
        self.toolbox.finder().find(&graph.vertex_collection, &criteria)
    }
}
