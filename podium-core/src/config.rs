use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ToolboxError;

const DEFAULT_NAME: &str = "default";

/// Toolbox settings, usually read from a TOML file.
///
/// ```toml
/// name = "social"
/// store_path = "/var/lib/social"
///
/// [graph]
/// name = "friends"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolboxConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub graph: Option<GraphConfig>,
    /// Directory of the embedded store, for backends that keep one.
    pub store_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphConfig {
    pub name: String,
    pub vertex_collection: Option<String>,
    pub edge_collection: Option<String>,
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

impl ToolboxConfig {
    pub fn new(name: impl Into<String>) -> Self {
        ToolboxConfig {
            name: name.into(),
            graph: None,
            store_path: None,
        }
    }

    pub fn with_graph(mut self, graph: GraphConfig) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ToolboxError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ToolboxError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

impl Default for ToolboxConfig {
    fn default() -> Self {
        Self::new(DEFAULT_NAME)
    }
}

impl GraphConfig {
    pub fn new(name: impl Into<String>) -> Self {
        GraphConfig {
            name: name.into(),
            vertex_collection: None,
            edge_collection: None,
        }
    }

    /// `{name}VertexCollection` unless configured.
    pub fn vertex_collection(&self) -> String {
        self.vertex_collection
            .clone()
            .unwrap_or_else(|| format!("{}VertexCollection", self.name))
    }

    /// `{name}EdgeCollection` unless configured.
    pub fn edge_collection(&self) -> String {
        self.edge_collection
            .clone()
            .unwrap_or_else(|| format!("{}EdgeCollection", self.name))
    }
}
