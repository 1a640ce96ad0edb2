//! Sequential workflow execution.

use super::error::{NodeError, WorkflowError};
use super::model::Workflow;
use super::order::execution_order;
use super::registry::{NodeRegistry, PortValues};
use crate::jobs::{JobBus, JobDescriptor, JobEvent, JobKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Outputs of every node, keyed by node id.
pub type WorkflowOutputs = HashMap<String, PortValues>;

/// Result of one workflow run.
#[derive(Debug)]
pub struct WorkflowRun {
    /// Whether every node ran successfully.
    pub success: bool,
    /// Node outputs. Empty when the run failed.
    pub outputs: WorkflowOutputs,
    /// Why the run failed.
    pub error: Option<WorkflowError>,
    /// Wall-clock duration.
    pub duration: Duration,
    /// Id of the job that tracked the run.
    pub job_id: String,
}

impl WorkflowRun {
    fn failed(error: WorkflowError, started: Instant, job_id: String) -> Self {
        Self {
            success: false,
            outputs: WorkflowOutputs::new(),
            error: Some(error),
            duration: started.elapsed(),
            job_id,
        }
    }

    /// Outputs of one node.
    #[must_use]
    pub fn node_outputs(&self, node_id: &str) -> Option<&PortValues> {
        self.outputs.get(node_id)
    }
}

/// Executes workflows one node at a time in dependency order.
pub struct WorkflowEngine {
    registry: Arc<NodeRegistry>,
    jobs: Arc<JobBus>,
}

impl WorkflowEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(registry: Arc<NodeRegistry>, jobs: Arc<JobBus>) -> Self {
        Self { registry, jobs }
    }

    /// The handler registry.
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Executes a workflow.
    pub async fn execute(&self, workflow: &Workflow) -> WorkflowRun {
        self.execute_with_cancel(workflow, None).await
    }

    /// Executes a workflow that stops at the next node boundary once `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        workflow: &Workflow,
        cancel: Option<&CancellationToken>,
    ) -> WorkflowRun {
        let started = Instant::now();
        let job = self.jobs.register_job(
            JobDescriptor::new(JobKind::Workflow, format!("workflow '{}'", workflow.name)),
            cancel,
        );
        let job_id = job.id().to_string();
        let token = job.token().clone();

        let order = match execution_order(workflow) {
            Ok(order) => order,
            Err(error) => {
                error!(workflow_id = %workflow.id, error = %error, "Workflow cannot be ordered");
                return WorkflowRun::failed(error, started, job_id);
            }
        };
        debug!(workflow_id = %workflow.id, order = ?order, "Execution order resolved");

        // Every handler is resolved before the first node runs.
        let mut plan = Vec::with_capacity(order.len());
        for node_id in &order {
            // The order only contains ids of declared nodes.
            let Some(node) = workflow.node(node_id) else { continue };
            let Some(handler) = self.registry.get(&node.node_type) else {
                let error = WorkflowError::UnknownNodeType {
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                };
                error!(node_id = %node.id, node_type = %node.node_type, "No handler for node type");
                return WorkflowRun::failed(error, started, job_id);
            };
            plan.push((node, handler));
        }

        let mut outputs = WorkflowOutputs::new();
        for (node, handler) in plan {
            if token.is_cancelled() {
                info!(workflow_id = %workflow.id, node_id = %node.id, "Workflow cancelled");
                return WorkflowRun::failed(WorkflowError::Cancelled, started, job_id);
            }

            let mut inputs = PortValues::new();
            for connection in workflow.connections.iter().filter(|c| c.target_node == node.id) {
                if let Some(value) = outputs
                    .get(&connection.source_node)
                    .and_then(|ports: &PortValues| ports.get(&connection.source_output))
                {
                    inputs.insert(connection.target_input.clone(), value.clone());
                }
            }

            job.dispatch_event(JobEvent::NodeStarted {
                job_id: job_id.clone(),
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            });
            let node_started = Instant::now();

            match handler.execute(&inputs, &node.parameters, &token).await {
                Ok(node_outputs) => {
                    let elapsed = node_started.elapsed();
                    debug!(node_id = %node.id, duration_ms = elapsed.as_millis() as u64, "Node completed");
                    job.dispatch_event(JobEvent::NodeCompleted {
                        job_id: job_id.clone(),
                        node_id: node.id.clone(),
                        duration_ms: elapsed.as_millis() as u64,
                    });
                    outputs.insert(node.id.clone(), node_outputs);
                }
                Err(source) => {
                    error!(node_id = %node.id, node_type = %node.node_type, error = %source, "Node failed");
                    job.dispatch_event(JobEvent::NodeFailed {
                        job_id: job_id.clone(),
                        node_id: node.id.clone(),
                        error: source.to_string(),
                    });
                    let error = if token.is_cancelled() && is_cancellation(&source) {
                        WorkflowError::Cancelled
                    } else {
                        WorkflowError::NodeFailed {
                            node_id: node.id.clone(),
                            node_type: node.node_type.clone(),
                            source,
                        }
                    };
                    return WorkflowRun::failed(error, started, job_id);
                }
            }
        }

        let duration = started.elapsed();
        info!(
            workflow_id = %workflow.id,
            nodes = order.len(),
            duration_ms = duration.as_millis() as u64,
            "Workflow completed"
        );
        job.succeed();

        WorkflowRun { success: true, outputs, error: None, duration, job_id }
    }
}

fn is_cancellation(error: &NodeError) -> bool {
    matches!(error, NodeError::Cancelled | NodeError::Routing(crate::error::OrchestrationError::Cancelled))
}
