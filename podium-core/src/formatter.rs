use std::collections::HashMap;

use crate::model::{GenericModel, ModelConstructor, constructor};
use crate::pod::Pod;

/// Chooses the model type a pod is wrapped in.
pub trait ModelFormatter {
    /// Returns the constructor for `pod`. `graph` is true when the toolbox
    /// works against a graph.
    fn format_model(&self, pod: &Pod, graph: bool) -> ModelConstructor;
}

/// Always picks `GenericModel`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFormatter;

impl ModelFormatter for DefaultFormatter {
    fn format_model(&self, _pod: &Pod, _graph: bool) -> ModelConstructor {
        constructor::<GenericModel>
    }
}

/// Maps `(collection, graph)` pairs to constructors, with a fallback for
/// anything unregistered.
pub struct RegistryFormatter {
    entries: HashMap<(String, bool), ModelConstructor>,
    fallback: ModelConstructor,
}

impl RegistryFormatter {
    pub fn new() -> Self {
        RegistryFormatter {
            entries: HashMap::new(),
            fallback: constructor::<GenericModel>,
        }
    }

    pub fn register(mut self, collection: impl Into<String>, graph: bool, ctor: ModelConstructor) -> Self {
        self.entries.insert((collection.into(), graph), ctor);
        self
    }

    pub fn fallback(mut self, ctor: ModelConstructor) -> Self {
        self.fallback = ctor;
        self
    }
}

impl Default for RegistryFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelFormatter for RegistryFormatter {
    fn format_model(&self, pod: &Pod, graph: bool) -> ModelConstructor {
        self.entries
            .get(&(pod.collection(), graph))
            .copied()
            .unwrap_or(self.fallback)
    }
}
