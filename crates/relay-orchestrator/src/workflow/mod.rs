//! Declarative node-graph workflows.
//!
//! A workflow is a set of typed nodes joined by port-to-port connections.
//! The engine orders nodes so every source runs before its targets, then
//! runs them one at a time, feeding each node the outputs of its upstream
//! connections.

pub mod engine;
pub mod error;
pub mod handlers;
pub mod model;
pub mod order;
pub mod registry;

pub use engine::{WorkflowEngine, WorkflowOutputs, WorkflowRun};
pub use error::{NodeError, WorkflowError};
pub use model::{Connection, Node, Position, Workflow};
pub use order::execution_order;
pub use registry::{NodeHandler, NodeRegistry, PortValues};
