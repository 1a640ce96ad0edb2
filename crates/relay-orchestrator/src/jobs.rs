//! Job bus: registration, cancellation and observation of long-running work.
//!
//! Every routed request, workflow run and scheduler wave registers a job and
//! holds a [`JobHandle`] for its lifetime. The handle unregisters the job when
//! dropped, so a job can never outlive the work it describes regardless of
//! how that work exits.
//!
//! Events are published on a broadcast channel. Publishing never blocks and
//! never fails the caller; with no subscribers events are simply discarded.

use crate::scheduler::TaskState;
use chrono::{DateTime, Utc};
use relay_abstraction::Severity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Job identifier.
pub type JobId = String;

/// Broadcast buffer size. Slow subscribers observe `Lagged` instead of
/// blocking publishers.
const EVENT_CAPACITY: usize = 256;

/// What kind of work a job represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// One routed request.
    Request,
    /// One workflow run.
    Workflow,
    /// One scheduler wave.
    SchedulerWave,
}

/// Describes a job at registration time.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    /// Job kind.
    pub kind: JobKind,
    /// Human-readable description.
    pub description: String,
}

impl JobDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(kind: JobKind, description: impl Into<String>) -> Self {
        Self { kind, description: description.into() }
    }
}

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// The work produced its result.
    Succeeded,
    /// The work failed.
    Failed,
    /// The job's cancellation signal fired.
    Cancelled,
}

/// Events published on the job bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job was registered.
    JobRegistered {
        job_id: JobId,
        kind: JobKind,
        description: String,
    },

    /// A job finished and was unregistered.
    JobCompleted {
        job_id: JobId,
        outcome: JobOutcome,
    },

    /// A job's cancellation signal was fired through the bus.
    JobCancelled {
        job_id: JobId,
    },

    /// A pipeline step failed; the router moves on to the next provider.
    ProviderFailed {
        job_id: JobId,
        provider: String,
        error: String,
        severity: Severity,
    },

    /// A workflow node began executing.
    NodeStarted {
        job_id: JobId,
        node_id: String,
        node_type: String,
    },

    /// A workflow node produced its outputs.
    NodeCompleted {
        job_id: JobId,
        node_id: String,
        duration_ms: u64,
    },

    /// A workflow node failed, aborting the run.
    NodeFailed {
        job_id: JobId,
        node_id: String,
        error: String,
    },

    /// A scheduled task changed state.
    TaskStateChanged {
        task_id: String,
        state: TaskState,
    },
}

/// A registered job as seen by `active_jobs`.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    /// Job id.
    pub id: JobId,
    /// Job kind.
    pub kind: JobKind,
    /// Description given at registration.
    pub description: String,
    /// Registration time.
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct JobEntry {
    kind: JobKind,
    description: String,
    started_at: DateTime<Utc>,
    token: CancellationToken,
}

/// Registry of in-flight jobs plus the event channel.
#[derive(Debug)]
pub struct JobBus {
    jobs: Mutex<HashMap<JobId, JobEntry>>,
    events: broadcast::Sender<JobEvent>,
}

impl JobBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { jobs: Mutex::new(HashMap::new()), events }
    }

    /// Registers a job and returns the guard that completes it.
    ///
    /// When `parent` is given the job's token is a child of it, so cancelling
    /// the caller's signal cancels the job.
    pub fn register_job(
        self: &Arc<Self>,
        descriptor: JobDescriptor,
        parent: Option<&CancellationToken>,
    ) -> JobHandle {
        let id = Uuid::new_v4().to_string();
        let token = parent.map_or_else(CancellationToken::new, CancellationToken::child_token);

        {
            let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
            jobs.insert(
                id.clone(),
                JobEntry {
                    kind: descriptor.kind,
                    description: descriptor.description.clone(),
                    started_at: Utc::now(),
                    token: token.clone(),
                },
            );
        }

        debug!(job_id = %id, kind = ?descriptor.kind, description = %descriptor.description, "Job registered");
        self.dispatch_event(JobEvent::JobRegistered {
            job_id: id.clone(),
            kind: descriptor.kind,
            description: descriptor.description,
        });

        JobHandle { bus: Arc::clone(self), id, token, outcome: JobOutcome::Failed }
    }

    /// Unregisters a job. Returns false if it was not registered.
    pub fn complete_job(&self, id: &str, outcome: JobOutcome) -> bool {
        let removed = self.jobs.lock().unwrap_or_else(PoisonError::into_inner).remove(id);
        if removed.is_none() {
            return false;
        }

        debug!(job_id = id, outcome = ?outcome, "Job completed");
        self.dispatch_event(JobEvent::JobCompleted { job_id: id.to_string(), outcome });
        true
    }

    /// Fires a job's cancellation signal. Returns false if it is not registered.
    pub fn cancel_job(&self, id: &str) -> bool {
        let token = {
            let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
            jobs.get(id).map(|entry| entry.token.clone())
        };

        match token {
            Some(token) => {
                token.cancel();
                debug!(job_id = id, "Job cancelled");
                self.dispatch_event(JobEvent::JobCancelled { job_id: id.to_string() });
                true
            }
            None => false,
        }
    }

    /// Publishes an event to current subscribers.
    pub fn dispatch_event(&self, event: JobEvent) {
        // A send error only means nobody is listening.
        let _ = self.events.send(event);
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Snapshot of registered jobs, oldest first.
    pub fn active_jobs(&self) -> Vec<JobSnapshot> {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshots: Vec<JobSnapshot> = jobs
            .iter()
            .map(|(id, entry)| JobSnapshot {
                id: id.clone(),
                kind: entry.kind,
                description: entry.description.clone(),
                started_at: entry.started_at,
            })
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.started_at);
        snapshots
    }

    /// Whether a job is registered.
    pub fn is_active(&self, id: &str) -> bool {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).contains_key(id)
    }
}

impl Default for JobBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped registration of one job.
///
/// Dropping the handle completes the job. The outcome defaults to `Failed`
/// (or `Cancelled` if the token fired) unless [`JobHandle::succeed`] was called.
#[derive(Debug)]
pub struct JobHandle {
    bus: Arc<JobBus>,
    id: JobId,
    token: CancellationToken,
    outcome: JobOutcome,
}

impl JobHandle {
    /// Job id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The job's cancellation signal.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Publishes an event on the owning bus.
    pub fn dispatch_event(&self, event: JobEvent) {
        self.bus.dispatch_event(event);
    }

    /// Completes the job as succeeded.
    pub fn succeed(mut self) {
        self.outcome = JobOutcome::Succeeded;
    }

    /// Completes the job as failed.
    pub fn fail(self) {}
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        let outcome = if self.outcome != JobOutcome::Succeeded && self.token.is_cancelled() {
            JobOutcome::Cancelled
        } else {
            self.outcome
        };
        self.bus.complete_job(&self.id, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> Arc<JobBus> {
        Arc::new(JobBus::new())
    }

    #[test]
    fn test_drop_unregisters_job() {
        let bus = bus();
        let handle = bus.register_job(JobDescriptor::new(JobKind::Request, "text via p1"), None);
        let id = handle.id().to_string();
        assert!(bus.is_active(&id));
        assert_eq!(bus.active_jobs().len(), 1);

        drop(handle);
        assert!(!bus.is_active(&id));
        assert!(bus.active_jobs().is_empty());
    }

    #[test]
    fn test_cancel_job_fires_token() {
        let bus = bus();
        let handle = bus.register_job(JobDescriptor::new(JobKind::Workflow, "wf"), None);
        assert!(bus.cancel_job(handle.id()));
        assert!(handle.is_cancelled());
        assert!(!bus.cancel_job("missing"));
    }

    #[test]
    fn test_parent_token_cancels_job() {
        let bus = bus();
        let parent = CancellationToken::new();
        let handle = bus.register_job(JobDescriptor::new(JobKind::Request, "r"), Some(&parent));
        parent.cancel();
        assert!(handle.token().is_cancelled());
    }

    #[test]
    fn test_complete_twice_reports_false() {
        let bus = bus();
        let handle = bus.register_job(JobDescriptor::new(JobKind::Request, "r"), None);
        let id = handle.id().to_string();
        handle.succeed();
        assert!(!bus.complete_job(&id, JobOutcome::Succeeded));
    }

    #[tokio::test]
    async fn test_events_are_published_in_order() {
        let bus = bus();
        let mut events = bus.subscribe();

        let handle = bus.register_job(JobDescriptor::new(JobKind::SchedulerWave, "wave 1"), None);
        let id = handle.id().to_string();
        handle.succeed();

        match events.recv().await.unwrap() {
            JobEvent::JobRegistered { job_id, kind, .. } => {
                assert_eq!(job_id, id);
                assert_eq!(kind, JobKind::SchedulerWave);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match events.recv().await.unwrap() {
            JobEvent::JobCompleted { job_id, outcome } => {
                assert_eq!(job_id, id);
                assert_eq!(outcome, JobOutcome::Succeeded);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_outcome_on_drop() {
        let bus = bus();
        let handle = bus.register_job(JobDescriptor::new(JobKind::Request, "r"), None);
        let mut events = bus.subscribe();
        bus.cancel_job(handle.id());
        handle.fail();

        let _cancelled = events.recv().await.unwrap();
        match events.recv().await.unwrap() {
            JobEvent::JobCompleted { outcome, .. } => assert_eq!(outcome, JobOutcome::Cancelled),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = JobEvent::TaskStateChanged { task_id: "a".to_string(), state: TaskState::Ready };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_state_changed");
        assert_eq!(json["state"], "ready");
    }
}
