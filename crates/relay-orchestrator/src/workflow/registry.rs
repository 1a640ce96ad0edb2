//! Node handler contract and the registry keyed by node type.

use super::error::NodeError;
use super::handlers;
use crate::routing::RequestRouter;
use async_trait::async_trait;
use relay_abstraction::RequestKind;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Named port values flowing into or out of a node.
pub type PortValues = HashMap<String, Value>;

/// Executes one node type.
///
/// Handlers may be invoked again for the same node on a later run and must
/// tolerate that; side effects are not rolled back.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Runs the node and returns its named outputs.
    async fn execute(
        &self,
        inputs: &PortValues,
        parameters: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<PortValues, NodeError>;
}

/// Registry of node handlers keyed by type tag.
#[derive(Default)]
pub struct NodeRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn NodeHandler>>>,
}

impl NodeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in handler. AI handlers route
    /// through `router`.
    #[must_use]
    pub fn with_builtins(router: Arc<RequestRouter>) -> Self {
        let registry = Self::new();
        registry.register("input", Arc::new(handlers::InputHandler));
        registry.register("transform", Arc::new(handlers::TransformHandler));
        registry.register("filter", Arc::new(handlers::FilterHandler));
        registry.register("merge", Arc::new(handlers::MergeHandler));
        registry.register("output", Arc::new(handlers::OutputHandler));
        registry.register(
            "ai_text",
            Arc::new(handlers::AiHandler::new(Arc::clone(&router), RequestKind::Text)),
        );
        registry.register(
            "ai_code",
            Arc::new(handlers::AiHandler::new(Arc::clone(&router), RequestKind::Code)),
        );
        registry.register("ai_image", Arc::new(handlers::AiHandler::new(router, RequestKind::Image)));
        registry.register("file_write", Arc::new(handlers::FileWriteHandler));
        registry.register("http_request", Arc::new(handlers::HttpRequestHandler::new()));
        registry
    }

    /// Registers a handler, replacing any previous handler for the type.
    pub fn register(&self, node_type: impl Into<String>, handler: Arc<dyn NodeHandler>) {
        let node_type = node_type.into();
        debug!(node_type = %node_type, "Registered node handler");
        self.handlers.write().unwrap_or_else(PoisonError::into_inner).insert(node_type, handler);
    }

    /// Looks up the handler for a type.
    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).get(node_type).cloned()
    }

    /// Whether a handler is registered for the type.
    pub fn contains(&self, node_type: &str) -> bool {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).contains_key(node_type)
    }

    /// Registered type tags, sorted.
    pub fn types(&self) -> Vec<String> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let mut types: Vec<String> = handlers.keys().cloned().collect();
        types.sort();
        types
    }
}
