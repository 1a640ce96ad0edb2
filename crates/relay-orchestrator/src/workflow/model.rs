//! Workflow definition and its JSON persistence format.

use super::error::{Result, WorkflowError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;

/// Editor position of a node. Carried through persistence, unused at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// One node of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node id.
    pub id: String,
    /// Handler type tag.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Editor position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Handler parameters.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Node {
    /// Creates a node without parameters.
    #[must_use]
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self { id: id.into(), node_type: node_type.into(), position: None, parameters: Map::new() }
    }

    /// Sets a parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// A directed edge from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Connection id.
    #[serde(default)]
    pub id: String,
    /// Source node id.
    pub source_node: String,
    /// Source output port.
    pub source_output: String,
    /// Target node id.
    pub target_node: String,
    /// Target input port.
    pub target_input: String,
}

impl Connection {
    /// Creates a connection with a generated id.
    #[must_use]
    pub fn new(
        source_node: impl Into<String>,
        source_output: impl Into<String>,
        target_node: impl Into<String>,
        target_input: impl Into<String>,
    ) -> Self {
        let (source_node, source_output) = (source_node.into(), source_output.into());
        let (target_node, target_input) = (target_node.into(), target_input.into());
        Self {
            id: format!("{}.{}->{}.{}", source_node, source_output, target_node, target_input),
            source_node,
            source_output,
            target_node,
            target_input,
        }
    }
}

/// A declarative node graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Nodes in declaration order.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Connections in declaration order.
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl Workflow {
    /// Creates an empty workflow.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), nodes: Vec::new(), connections: Vec::new() }
    }

    /// Adds a node.
    #[must_use]
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds a connection.
    #[must_use]
    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    /// Looks up a node.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Parses the JSON persistence format.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes to the JSON persistence format.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads a workflow file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Saves the workflow to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Checks structural validity: unique non-empty node ids and connections
    /// between existing nodes.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if node.id.is_empty() {
                return Err(WorkflowError::Invalid("node id cannot be empty".to_string()));
            }
            if node.node_type.is_empty() {
                return Err(WorkflowError::Invalid(format!("node '{}' has no type", node.id)));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(WorkflowError::Invalid(format!("duplicate node id '{}'", node.id)));
            }
        }

        for connection in &self.connections {
            for endpoint in [&connection.source_node, &connection.target_node] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(WorkflowError::UnknownNode {
                        connection: connection.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
