//! Agentic task scheduler.
//!
//! Runs independent tasks fully in parallel, or dependency-ordered tasks in
//! waves, routing every task through the request router.

mod agentic;
mod types;

pub use agentic::TaskScheduler;
pub use types::{
    AgentTask, AgentTaskResult, DependencyReport, ParallelReport, TaskOutcome, TaskState,
};
