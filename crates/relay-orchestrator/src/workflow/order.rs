//! Execution order for workflow graphs.

use super::error::{Result, WorkflowError};
use super::model::Workflow;
use std::collections::{HashMap, HashSet};

/// Computes the order in which a workflow's nodes run.
///
/// Depth-first traversal that visits a node's upstream sources before the
/// node itself. Traversal is seeded from nodes without incoming connections
/// and then from every remaining node in declaration order, so disconnected
/// nodes and nodes only reachable through a cycle are still examined. The
/// first node reached through its own upstream chain is reported as a cycle.
///
/// For every connection A -> B, A precedes B in the returned order.
pub fn execution_order(workflow: &Workflow) -> Result<Vec<String>> {
    workflow.validate()?;

    let mut upstream: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut has_incoming: HashSet<&str> = HashSet::new();
    for connection in &workflow.connections {
        let sources = upstream.entry(connection.target_node.as_str()).or_default();
        if !sources.contains(&connection.source_node.as_str()) {
            sources.push(connection.source_node.as_str());
        }
        has_incoming.insert(connection.target_node.as_str());
    }

    let roots = workflow.nodes.iter().filter(|node| !has_incoming.contains(node.id.as_str()));
    let rest = workflow.nodes.iter().filter(|node| has_incoming.contains(node.id.as_str()));

    let mut traversal = Traversal {
        upstream: &upstream,
        visited: HashSet::new(),
        stack: Vec::new(),
        order: Vec::with_capacity(workflow.nodes.len()),
    };
    for node in roots.chain(rest) {
        traversal.visit(node.id.as_str())?;
    }

    Ok(traversal.order.into_iter().map(str::to_string).collect())
}

struct Traversal<'a> {
    upstream: &'a HashMap<&'a str, Vec<&'a str>>,
    visited: HashSet<&'a str>,
    /// Nodes on the current path, for cycle reporting.
    stack: Vec<&'a str>,
    order: Vec<&'a str>,
}

impl<'a> Traversal<'a> {
    fn visit(&mut self, node: &'a str) -> Result<()> {
        if self.visited.contains(node) {
            return Ok(());
        }
        if let Some(position) = self.stack.iter().position(|on_path| *on_path == node) {
            // The path runs downstream-to-upstream; report it in data-flow order.
            let mut path: Vec<String> =
                self.stack[position..].iter().rev().map(|id| (*id).to_string()).collect();
            path.insert(0, node.to_string());
            return Err(WorkflowError::CycleDetected { path });
        }

        self.stack.push(node);
        let upstream = self.upstream;
        if let Some(sources) = upstream.get(node) {
            for &source in sources {
                self.visit(source)?;
            }
        }
        self.stack.pop();

        self.visited.insert(node);
        self.order.push(node);
        Ok(())
    }
}
