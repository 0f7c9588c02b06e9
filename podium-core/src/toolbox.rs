use std::fmt;
use std::rc::Rc;

use crate::config::{GraphConfig, ToolboxConfig};
use crate::driver::{CollectionMetadata, QueryEngine, Transport};
use crate::error::PodError;
use crate::finder::Finder;
use crate::formatter::{DefaultFormatter, ModelFormatter};
use crate::id::DocumentId;
use crate::manager::PodManager;
use crate::memory::MemoryDatabase;
use crate::observable::Observable;
use crate::pod::{Pod, PodKind, PodRef};

/// Collections of the graph a toolbox works against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphInfo {
    pub name: String,
    pub vertex_collection: String,
    pub edge_collection: String,
}

impl From<&GraphConfig> for GraphInfo {
    fn from(config: &GraphConfig) -> Self {
        GraphInfo {
            name: config.name.clone(),
            vertex_collection: config.vertex_collection(),
            edge_collection: config.edge_collection(),
        }
    }
}

/// The connection context pods belong to.
///
/// Holds the collaborators, the model formatter, the optional graph
/// description and the lifecycle event bus every pod listens on. Shared as
/// `Rc<Toolbox>`; read-only once built.
pub struct Toolbox {
    name: String,
    transport: Rc<dyn Transport>,
    queries: Rc<dyn QueryEngine>,
    metadata: Rc<dyn CollectionMetadata>,
    formatter: Box<dyn ModelFormatter>,
    graph: Option<GraphInfo>,
    events: Observable<PodRef>,
}

impl Toolbox {
    pub fn builder(config: ToolboxConfig) -> ToolboxBuilder {
        ToolboxBuilder::new(config)
    }

    /// A toolbox whose every collaborator is a fresh `MemoryDatabase`.
    pub fn in_memory(config: ToolboxConfig) -> Result<Rc<Toolbox>, PodError> {
        Self::builder(config)
            .database(Rc::new(MemoryDatabase::new()))
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &Rc<dyn Transport> {
        &self.transport
    }

    pub fn queries(&self) -> &Rc<dyn QueryEngine> {
        &self.queries
    }

    pub fn metadata(&self) -> &Rc<dyn CollectionMetadata> {
        &self.metadata
    }

    pub fn formatter(&self) -> &dyn ModelFormatter {
        self.formatter.as_ref()
    }

    pub fn graph(&self) -> Option<&GraphInfo> {
        self.graph.as_ref()
    }

    pub fn is_graph(&self) -> bool {
        self.graph.is_some()
    }

    /// The lifecycle event bus.
    pub fn events(&self) -> &Observable<PodRef> {
        &self.events
    }

    /// The kind of pod records of `collection` are hydrated into.
    pub fn kind_for(&self, collection: &str) -> PodKind {
        match &self.graph {
            Some(graph) if graph.edge_collection == collection => PodKind::Edge,
            Some(graph) if graph.vertex_collection == collection => PodKind::Vertex,
            _ => PodKind::Document,
        }
    }

    /// Splits `collection/key`.
    pub fn parse_id(&self, id: &str) -> Result<DocumentId, PodError> {
        DocumentId::parse(id)
    }

    /// Whether `pod` was created through this toolbox.
    pub fn owns(&self, pod: &Pod) -> bool {
        std::ptr::eq(Rc::as_ptr(pod.toolbox()), self)
    }

    pub fn pods(self: &Rc<Self>) -> PodManager<'_> {
        PodManager::new(self)
    }

    pub fn finder(self: &Rc<Self>) -> Finder<'_> {
        Finder::new(self)
    }
}

impl fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolbox")
            .field("name", &self.name)
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}

/// Assembles a `Toolbox` from a config and its collaborators.
pub struct ToolboxBuilder {
    config: ToolboxConfig,
    transport: Option<Rc<dyn Transport>>,
    queries: Option<Rc<dyn QueryEngine>>,
    metadata: Option<Rc<dyn CollectionMetadata>>,
    formatter: Box<dyn ModelFormatter>,
}

impl ToolboxBuilder {
    pub fn new(config: ToolboxConfig) -> Self {
        ToolboxBuilder {
            config,
            transport: None,
            queries: None,
            metadata: None,
            formatter: Box::new(DefaultFormatter),
        }
    }

    pub fn transport(mut self, transport: Rc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn query_engine(mut self, queries: Rc<dyn QueryEngine>) -> Self {
        self.queries = Some(queries);
        self
    }

    pub fn metadata(mut self, metadata: Rc<dyn CollectionMetadata>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Uses one backend for all three collaborator roles.
    pub fn database<D>(self, database: Rc<D>) -> Self
    where
        D: Transport + QueryEngine + CollectionMetadata + 'static,
    {
        self.transport(database.clone())
            .query_engine(database.clone())
            .metadata(database)
    }

    pub fn formatter(mut self, formatter: impl ModelFormatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    pub fn build(self) -> Result<Rc<Toolbox>, PodError> {
        let missing = |role: &str| PodError::Configuration(format!("toolbox {:?} has no {role}", self.config.name));
        let transport = self.transport.clone().ok_or_else(|| missing("transport"))?;
        let queries = self.queries.clone().ok_or_else(|| missing("query engine"))?;
        let metadata = self.metadata.clone().ok_or_else(|| missing("metadata provider"))?;
        let graph = self.config.graph.as_ref().map(GraphInfo::from);

        Ok(Rc::new(Toolbox {
            name: self.config.name,
            transport,
            queries,
            metadata,
            formatter: self.formatter,
            graph,
            events: Observable::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_toolbox() -> Rc<Toolbox> {
        let config = ToolboxConfig::new("social").with_graph(GraphConfig::new("friends"));
        Toolbox::in_memory(config).unwrap()
    }

    #[test]
    fn kind_follows_graph_collections() {
        let toolbox = graph_toolbox();
        assert_eq!(toolbox.kind_for("friendsVertexCollection"), PodKind::Vertex);
        assert_eq!(toolbox.kind_for("friendsEdgeCollection"), PodKind::Edge);
        assert_eq!(toolbox.kind_for("notes"), PodKind::Document);

        let plain = Toolbox::in_memory(ToolboxConfig::default()).unwrap();
        assert!(!plain.is_graph());
        assert_eq!(plain.kind_for("friendsVertexCollection"), PodKind::Document);
    }

    #[test]
    fn missing_collaborator_is_a_configuration_error() {
        let err = Toolbox::builder(ToolboxConfig::default())
            .transport(Rc::new(MemoryDatabase::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, PodError::Configuration(_)));
    }

    #[test]
    fn owns_only_its_own_pods() {
        let toolbox = graph_toolbox();
        let other = graph_toolbox();
        let pod = Pod::new(&toolbox, PodKind::Document, "notes");
        assert!(toolbox.owns(&pod));
        assert!(!other.owns(&pod));
    }

    #[test]
    fn parse_id_rejects_malformed() {
        let toolbox = graph_toolbox();
        assert_eq!(toolbox.parse_id("notes/1").unwrap().key(), "1");
        assert!(matches!(toolbox.parse_id("notes"), Err(PodError::MalformedId(_))));
    }
}
