use super::types::{
    AgentTask, AgentTaskResult, DependencyReport, ParallelReport, TaskOutcome, TaskState,
};
use crate::config::{DependencyFailurePolicy, SchedulerSettings};
use crate::error::OrchestrationError;
use crate::jobs::{JobDescriptor, JobEvent, JobKind};
use crate::routing::RequestRouter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Schedules agent tasks over a shared router.
///
/// The scheduler exposes no cancellation of its own; each task's request
/// carries whatever abort signal its caller attached.
pub struct TaskScheduler {
    router: Arc<RequestRouter>,
    policy: DependencyFailurePolicy,
    max_concurrent: Option<usize>,
}

impl TaskScheduler {
    /// Creates a scheduler with the default (unblock) policy and no concurrency bound.
    #[must_use]
    pub fn new(router: Arc<RequestRouter>) -> Self {
        Self { router, policy: DependencyFailurePolicy::default(), max_concurrent: None }
    }

    /// Creates a scheduler from configuration.
    #[must_use]
    pub fn from_settings(router: Arc<RequestRouter>, settings: &SchedulerSettings) -> Self {
        Self {
            router,
            policy: settings.dependency_failure_policy,
            max_concurrent: settings.max_concurrent_tasks.map(|max| max.max(1)),
        }
    }

    /// Sets the failed-dependency policy.
    #[must_use]
    pub fn with_policy(mut self, policy: DependencyFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bounds the number of tasks routed at once within a wave.
    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = Some(max.max(1));
        self
    }

    /// The failed-dependency policy in effect.
    pub fn policy(&self) -> DependencyFailurePolicy {
        self.policy
    }

    fn publish(&self, task_id: &str, state: TaskState) {
        self.router
            .jobs()
            .dispatch_event(JobEvent::TaskStateChanged { task_id: task_id.to_string(), state });
    }

    /// Runs every task concurrently and waits for all of them to settle.
    ///
    /// Higher priority tasks are submitted first; completion order is not
    /// guaranteed. Dependencies are ignored.
    pub async fn run_parallel(&self, tasks: Vec<AgentTask>) -> ParallelReport {
        let started = Instant::now();
        if tasks.is_empty() {
            return ParallelReport::default();
        }

        let mut tasks = tasks;
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority));

        let job = self.router.jobs().register_job(
            JobDescriptor::new(JobKind::SchedulerWave, format!("wave of {} tasks", tasks.len())),
            None,
        );
        debug!(job_id = job.id(), tasks = tasks.len(), "Starting scheduler wave");

        let semaphore = self.max_concurrent.map(|max| Arc::new(Semaphore::new(max)));
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let router = Arc::clone(&self.router);
            let semaphore = semaphore.clone();
            let task_id = task.id.clone();

            let handle = tokio::spawn(async move {
                // The semaphore is never closed, so acquisition only waits.
                let _permit = match semaphore {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };

                router.jobs().dispatch_event(JobEvent::TaskStateChanged {
                    task_id: task.id.clone(),
                    state: TaskState::Running,
                });

                let task_started = Instant::now();
                let outcome = match router.complete(task.request).await {
                    Ok(response) => TaskOutcome::Fulfilled(response),
                    Err(error) => TaskOutcome::Rejected(error),
                };
                AgentTaskResult { id: task.id, outcome, duration: task_started.elapsed() }
            });
            handles.push((task_id, handle));
        }

        let mut report = ParallelReport::default();
        for (task_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => AgentTaskResult {
                    id: task_id.clone(),
                    outcome: TaskOutcome::Rejected(OrchestrationError::TaskAborted {
                        task_id,
                        message: join_error.to_string(),
                    }),
                    duration: started.elapsed(),
                },
            };

            if result.outcome.is_fulfilled() {
                self.publish(&result.id, TaskState::Fulfilled);
                report.completed.push(result);
            } else {
                if let Some(error) = result.outcome.error() {
                    warn!(task_id = %result.id, error = %error, "Task rejected");
                }
                self.publish(&result.id, TaskState::Rejected);
                report.failed.push(result);
            }
        }
        report.duration = started.elapsed();

        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            duration_ms = report.duration.as_millis() as u64,
            "Scheduler wave finished"
        );

        if report.failed.is_empty() {
            job.succeed();
        } else {
            job.fail();
        }
        report
    }

    /// Runs tasks in waves so that no task starts before every dependency
    /// has a recorded result.
    ///
    /// Under [`DependencyFailurePolicy::Unblock`] a rejected dependency still
    /// counts as resolved. Under [`DependencyFailurePolicy::Block`] its
    /// dependents are rejected without running. Tasks that can never become
    /// ready (cycles, unknown dependencies) stop the loop and are reported in
    /// `unresolved`.
    pub async fn run_with_dependencies(&self, tasks: Vec<AgentTask>) -> DependencyReport {
        let started = Instant::now();
        let mut report = DependencyReport::default();
        // Task id -> whether it was fulfilled.
        let mut resolved: HashMap<String, bool> = HashMap::new();
        let mut pending = tasks;

        for task in &pending {
            self.publish(&task.id, TaskState::Pending);
        }

        while !pending.is_empty() {
            let (ready, waiting): (Vec<AgentTask>, Vec<AgentTask>) = pending
                .into_iter()
                .partition(|task| task.dependencies.iter().all(|dep| resolved.contains_key(dep)));
            pending = waiting;

            if ready.is_empty() {
                report.unresolved = pending.iter().map(|task| task.id.clone()).collect();
                warn!(unresolved = ?report.unresolved, "Scheduler deadlock: tasks can never become ready");
                report.deadlock = Some(OrchestrationError::SchedulerDeadlock {
                    unresolved: report.unresolved.clone(),
                });
                break;
            }

            let mut runnable = Vec::with_capacity(ready.len());
            for task in ready {
                let failed_dependency = match self.policy {
                    DependencyFailurePolicy::Unblock => None,
                    DependencyFailurePolicy::Block => task
                        .dependencies
                        .iter()
                        .find(|dep| resolved.get(*dep) == Some(&false))
                        .cloned(),
                };

                if let Some(dependency) = failed_dependency {
                    debug!(task_id = %task.id, dependency = %dependency, "Skipping task with failed dependency");
                    self.publish(&task.id, TaskState::Rejected);
                    resolved.insert(task.id.clone(), false);
                    report.failed.push(AgentTaskResult {
                        outcome: TaskOutcome::Rejected(OrchestrationError::DependencyFailed {
                            task_id: task.id.clone(),
                            dependency,
                        }),
                        id: task.id,
                        duration: Duration::ZERO,
                    });
                } else {
                    self.publish(&task.id, TaskState::Ready);
                    runnable.push(task);
                }
            }

            if runnable.is_empty() {
                continue;
            }

            report.waves += 1;
            debug!(wave = report.waves, tasks = runnable.len(), "Running dependency wave");
            let wave = self.run_parallel(runnable).await;
            for result in wave.completed {
                resolved.insert(result.id.clone(), true);
                report.completed.push(result);
            }
            for result in wave.failed {
                resolved.insert(result.id.clone(), false);
                report.failed.push(result);
            }
        }

        report.duration = started.elapsed();
        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            unresolved = report.unresolved.len(),
            waves = report.waves,
            "Dependency run finished"
        );
        report
    }
}
