//! Task orchestration core for Relay.
//!
//! Routes AI requests across registered provider adapters with fallback,
//! runs node-graph workflows, and schedules batches of agent tasks with
//! optional dependencies. A shared [`QuotaGuard`] enforces the session
//! budget and a [`JobBus`] tracks every in-flight unit of work.

pub mod config;
pub mod error;
pub mod jobs;
pub mod providers;
pub mod quota;
pub mod routing;
pub mod scheduler;
pub mod security;
pub mod workflow;

pub use config::{
    BudgetConfig, CircuitBreakerSettings, ConfigError, ConfigLoader, DependencyFailurePolicy,
    OrchestratorConfig, PricingEntry, RoutingSettings, SchedulerSettings, SecuritySettings,
};
pub use error::{OrchestrationError, ProviderFailure, Result};
pub use jobs::{
    JobBus, JobDescriptor, JobEvent, JobHandle, JobId, JobKind, JobOutcome, JobSnapshot,
};
pub use providers::EchoProvider;
pub use quota::{BudgetStatus, QuotaGuard};
pub use routing::{
    CircuitBreaker, CostModel, DenyList, GateSet, ProviderGate, ProviderRegistry, RequestRouter,
};
pub use scheduler::{
    AgentTask, AgentTaskResult, DependencyReport, ParallelReport, TaskOutcome, TaskScheduler,
    TaskState,
};
pub use security::PromptFilter;
pub use workflow::{
    Connection, Node, NodeError, NodeHandler, NodeRegistry, Workflow, WorkflowEngine,
    WorkflowError, WorkflowRun,
};
