//! Task and report types for the scheduler.

use crate::error::OrchestrationError;
use relay_abstraction::{Request, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One unit of work for the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    /// Unique task id.
    pub id: String,
    /// The request to route.
    pub request: Request,
    /// Ids of tasks that must have a result before this one runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Higher priority tasks are submitted first within a wave.
    #[serde(default)]
    pub priority: i32,
}

impl AgentTask {
    /// Creates a task with no dependencies and priority 0.
    #[must_use]
    pub fn new(id: impl Into<String>, request: Request) -> Self {
        Self { id: id.into(), request, dependencies: Vec::new(), priority: 0 }
    }

    /// Adds a dependency.
    #[must_use]
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Lifecycle of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for dependencies.
    Pending,
    /// Dependencies resolved; part of the next wave.
    Ready,
    /// Routing in progress.
    Running,
    /// Produced a response.
    Fulfilled,
    /// Failed, or skipped because of a failed dependency.
    Rejected,
}

/// Result or error of one task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// The task produced a response.
    Fulfilled(Response),
    /// The task failed.
    Rejected(OrchestrationError),
}

impl TaskOutcome {
    /// Whether the task succeeded.
    #[must_use]
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    /// The response, if fulfilled.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Fulfilled(response) => Some(response),
            Self::Rejected(_) => None,
        }
    }

    /// The error, if rejected.
    #[must_use]
    pub fn error(&self) -> Option<&OrchestrationError> {
        match self {
            Self::Fulfilled(_) => None,
            Self::Rejected(error) => Some(error),
        }
    }
}

/// Result of one task.
#[derive(Debug, Clone)]
pub struct AgentTaskResult {
    /// Task id.
    pub id: String,
    /// Value or error.
    pub outcome: TaskOutcome,
    /// Time spent routing the task.
    pub duration: Duration,
}

/// Result of `run_parallel`.
#[derive(Debug, Clone, Default)]
pub struct ParallelReport {
    /// Fulfilled tasks, in submission order.
    pub completed: Vec<AgentTaskResult>,
    /// Rejected tasks, in submission order.
    pub failed: Vec<AgentTaskResult>,
    /// Wall-clock duration of the whole run.
    pub duration: Duration,
}

/// Result of `run_with_dependencies`.
#[derive(Debug, Clone, Default)]
pub struct DependencyReport {
    /// Fulfilled tasks, in the order their waves finished.
    pub completed: Vec<AgentTaskResult>,
    /// Rejected tasks, in the order their waves finished.
    pub failed: Vec<AgentTaskResult>,
    /// Tasks that never became ready.
    pub unresolved: Vec<String>,
    /// Set when the run stopped with unresolved tasks.
    pub deadlock: Option<OrchestrationError>,
    /// Number of waves executed.
    pub waves: usize,
    /// Wall-clock duration of the whole run.
    pub duration: Duration,
}

impl DependencyReport {
    /// True when every task ran and none failed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failed.is_empty() && self.unresolved.is_empty()
    }

    /// Looks up a task's result by id.
    #[must_use]
    pub fn result(&self, id: &str) -> Option<&AgentTaskResult> {
        self.completed.iter().chain(self.failed.iter()).find(|result| result.id == id)
    }
}
