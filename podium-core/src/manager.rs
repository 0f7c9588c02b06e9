use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::driver::{FROM, ID, TO, WireRecord, Write};
use crate::endpoint::Endpoint;
use crate::error::{PodError, ToolboxError};
use crate::event::Lifecycle;
use crate::id::DocumentId;
use crate::model::ModelRef;
use crate::observable::Observer;
use crate::pod::{Pod, PodKind, PodRef};
use crate::query::{Criteria, Query};
use crate::toolbox::{GraphInfo, Toolbox};

/// Creates, persists, deletes and loads pods of one toolbox, raising their
/// lifecycle events.
///
/// Obtained through `Toolbox::pods`.
pub struct PodManager<'a> {
    toolbox: &'a Rc<Toolbox>,
}

impl<'a> PodManager<'a> {
    pub(crate) fn new(toolbox: &'a Rc<Toolbox>) -> Self {
        PodManager { toolbox }
    }

    fn graph(&self) -> Result<&'a GraphInfo, ToolboxError> {
        self.toolbox
            .graph()
            .ok_or_else(|| ToolboxError::NotGraph(self.toolbox.name().to_string()))
    }

    fn fire(&self, lifecycle: Lifecycle, pod: &PodRef) -> Result<(), ToolboxError> {
        self.toolbox.events().notify(lifecycle.as_str(), Rc::clone(pod))?;
        Ok(())
    }

    /// Wraps `pod` in the model the formatter picks, binds the two, subscribes
    /// the pod to the lifecycle events and raises `lifecycle`.
    fn adopt(&self, pod: Pod, lifecycle: Lifecycle) -> Result<ModelRef, ToolboxError> {
        let pod: PodRef = Rc::new(pod);
        let constructor = self.toolbox.formatter().format_model(&pod, self.toolbox.is_graph());
        let model = constructor();
        model.load_pod(Rc::clone(&pod))?;
        pod.load_model(&model)?;

        let listener: Rc<dyn Observer<PodRef>> = pod.clone();
        self.toolbox.events().attach(&Lifecycle::ALL[..], &listener)?;
        self.fire(lifecycle, &pod)?;
        Ok(model)
    }

    fn owned<'m>(&self, model: &'m ModelRef) -> Result<&'m PodRef, ToolboxError> {
        let pod = model.pod()?;
        if !self.toolbox.owns(pod) {
            return Err(ToolboxError::ForeignPod);
        }
        Ok(pod)
    }

    /// A fresh model for `collection`. Graph collections get vertex or edge
    /// pods.
    #[instrument(skip(self))]
    pub fn dispense(&self, collection: &str) -> Result<ModelRef, ToolboxError> {
        let kind = self.toolbox.kind_for(collection);
        self.adopt(Pod::new(self.toolbox, kind, collection), Lifecycle::AfterDispense)
    }

    /// A fresh vertex in the graph's vertex collection.
    pub fn dispense_vertex(&self) -> Result<ModelRef, ToolboxError> {
        let graph = self.graph()?;
        self.dispense(&graph.vertex_collection)
    }

    /// A fresh edge in the graph's edge collection. Model endpoints must be
    /// vertices.
    pub fn dispense_edge(&self, from: Option<Endpoint>, to: Option<Endpoint>) -> Result<ModelRef, ToolboxError> {
        let graph = self.graph()?;
        for endpoint in from.iter().chain(to.iter()) {
            endpoint.check_vertex()?;
        }
        let pod = Pod::new_edge(self.toolbox, &graph.edge_collection, from, to);
        self.adopt(pod, Lifecycle::AfterDispense)
    }

    /// A fresh model with a copy of `model`'s properties (and endpoints).
    pub fn duplicate(&self, model: &ModelRef) -> Result<ModelRef, ToolboxError> {
        let pod = self.owned(model)?;
        self.adopt(pod.duplicate(), Lifecycle::AfterDispense)
    }

    /// Persists the model's pod and returns its id. Unchanged persisted pods
    /// are not written again. Unsaved endpoint vertices of an edge are stored
    /// first.
    #[instrument(skip_all, fields(toolbox = %self.toolbox.name()))]
    pub fn store(&self, model: &ModelRef) -> Result<DocumentId, ToolboxError> {
        let pod = self.owned(model)?;
        self.store_pod(pod)
    }

    pub fn store_all(&self, models: &[ModelRef]) -> Result<Vec<DocumentId>, ToolboxError> {
        models.iter().map(|model| self.store(model)).collect()
    }

    fn store_pod(&self, pod: &PodRef) -> Result<DocumentId, ToolboxError> {
        if !pod.is_new() && !pod.has_changed() {
            if let Some(id) = pod.id() {
                debug!(%id, "unchanged, not stored");
                return Ok(id);
            }
        }

        self.fire(Lifecycle::BeforeStore, pod)?;
        if pod.kind() == PodKind::Edge {
            for endpoint in pod.endpoints() {
                if let Endpoint::Resolved(model) = endpoint {
                    let vertex = self.owned(&model)?;
                    if vertex.is_new() {
                        self.store_pod(vertex)?;
                    }
                }
            }
        }

        let record = pod.to_driver_format()?;
        let write = if pod.is_new() { Write::Insert } else { Write::Replace };
        let persisted = self
            .toolbox
            .transport()
            .persist(&pod.collection(), &record, write)?;
        pod.confirm_saved(&persisted);
        debug!(id = %persisted.id, revision = %persisted.revision, ?write, "stored");

        self.fire(Lifecycle::AfterStore, pod)?;
        Ok(persisted.id)
    }

    /// Removes the model's record. Vertices of a graph take their edges
    /// with them.
    #[instrument(skip_all, fields(toolbox = %self.toolbox.name()))]
    pub fn delete(&self, model: &ModelRef) -> Result<(), ToolboxError> {
        let pod = self.owned(model)?;
        let id = match pod.id() {
            Some(id) if !pod.is_new() => id,
            _ => return Err(PodError::NotPersisted.into()),
        };

        self.fire(Lifecycle::BeforeDelete, pod)?;
        if pod.kind() == PodKind::Vertex {
            if let Some(graph) = self.toolbox.graph() {
                self.remove_edges_of(graph, &id)?;
            }
        }
        self.toolbox.transport().remove(&id)?;
        pod.confirm_deleted();
        debug!(%id, "deleted");

        self.fire(Lifecycle::AfterDelete, pod)
    }

    fn remove_edges_of(&self, graph: &GraphInfo, vertex: &DocumentId) -> Result<(), ToolboxError> {
        for end in [FROM, TO] {
            let query = Query::new(&graph.edge_collection, Criteria::new().eq(end, vertex.to_string()));
            for record in self.toolbox.queries().run_filtered(&query)? {
                let Some(Value::String(raw)) = record.get(ID) else {
                    continue;
                };
                let edge = DocumentId::parse(raw)?;
                debug!(%edge, %vertex, "removing connected edge");
                self.toolbox.transport().remove(&edge)?;
            }
        }
        Ok(())
    }

    /// Fetches `collection/key`. `None` if it does not exist.
    #[instrument(skip(self))]
    pub fn load(&self, collection: &str, key: &str) -> Result<Option<ModelRef>, ToolboxError> {
        match self.toolbox.transport().fetch(collection, key)? {
            Some(record) => self.hydrate(collection, &record).map(Some),
            None => Ok(None),
        }
    }

    pub fn load_by_id(&self, id: &DocumentId) -> Result<Option<ModelRef>, ToolboxError> {
        self.load(id.collection(), id.key())
    }

    /// Fetches several keys of one collection. Missing keys are skipped.
    pub fn load_all<K: AsRef<str>>(
        &self,
        collection: &str,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<Vec<ModelRef>, ToolboxError> {
        let mut models = Vec::new();
        for key in keys {
            if let Some(model) = self.load(collection, key.as_ref())? {
                models.push(model);
            }
        }
        Ok(models)
    }

    /// Wraps a record read from `collection` in a model and raises
    /// `after_open`.
    pub fn hydrate(&self, collection: &str, record: &WireRecord) -> Result<ModelRef, ToolboxError> {
        let kind = self.toolbox.kind_for(collection);
        let pod = Pod::from_wire(self.toolbox, kind, collection, record)?;
        self.adopt(pod, Lifecycle::AfterOpen)
    }
}
