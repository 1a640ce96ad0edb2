// Error types for routing and scheduling

use relay_abstraction::{ProviderError, RequestKind};
use thiserror::Error;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// One failed pipeline step.
#[derive(Debug, Clone, Error)]
#[error("provider '{provider}' failed: {error}")]
pub struct ProviderFailure {
    /// Tag of the provider that failed.
    pub provider: String,
    /// The underlying error.
    #[source]
    pub error: ProviderError,
}

/// Orchestration errors
#[derive(Debug, Clone, Error)]
pub enum OrchestrationError {
    /// The prompt failed a hard security rule. No provider was invoked.
    #[error("Request blocked by security filter: {reason}")]
    SecurityBlocked {
        /// Reason reported by the filter
        reason: String,
    },

    /// The session budget is spent. No provider was invoked.
    #[error("Session budget exhausted: ${spent:.4} spent, {tokens} tokens used")]
    QuotaExceeded {
        /// Cost recorded so far (USD)
        spent: f64,
        /// Tokens recorded so far
        tokens: u64,
    },

    /// Every candidate provider failed, or there were none.
    #[error("No provider could fulfil {kind} request ({attempted} attempted)")]
    PipelineExhausted {
        /// Request kind
        kind: RequestKind,
        /// Number of providers attempted
        attempted: usize,
        /// The last provider's failure, absent when there were no candidates
        #[source]
        last: Option<ProviderFailure>,
    },

    /// Bundle nesting exceeded the configured depth.
    #[error("Bundle nesting exceeds maximum depth of {max_depth}")]
    BundleTooDeep {
        /// Configured limit
        max_depth: usize,
    },

    /// The job was cancelled before a provider succeeded.
    #[error("Request cancelled")]
    Cancelled,

    /// A dependency was rejected and the scheduler blocks dependents of failures.
    #[error("Task '{task_id}' skipped: dependency '{dependency}' failed")]
    DependencyFailed {
        /// The skipped task
        task_id: String,
        /// The failed dependency
        dependency: String,
    },

    /// Tasks that can never become ready (cycle or unknown dependency).
    #[error("Unsatisfiable task dependencies: {}", unresolved.join(", "))]
    SchedulerDeadlock {
        /// Ids of the stuck tasks
        unresolved: Vec<String>,
    },

    /// A scheduled task panicked or was aborted by the runtime.
    #[error("Task '{task_id}' aborted: {message}")]
    TaskAborted {
        /// Task id
        task_id: String,
        /// Join error description
        message: String,
    },
}

impl OrchestrationError {
    /// Whether retrying the same request later may succeed.
    ///
    /// Security and budget failures will not succeed until configuration or
    /// the session changes.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PipelineExhausted { .. }
            | Self::Cancelled
            | Self::DependencyFailed { .. }
            | Self::TaskAborted { .. } => true,
            Self::SecurityBlocked { .. }
            | Self::QuotaExceeded { .. }
            | Self::BundleTooDeep { .. }
            | Self::SchedulerDeadlock { .. } => false,
        }
    }

    /// The last provider failure behind an exhausted pipeline.
    #[must_use]
    pub fn last_provider_failure(&self) -> Option<&ProviderFailure> {
        match self {
            Self::PipelineExhausted { last, .. } => last.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_exhausted_source_is_last_failure() {
        let err = OrchestrationError::PipelineExhausted {
            kind: RequestKind::Text,
            attempted: 2,
            last: Some(ProviderFailure {
                provider: "p2".to_string(),
                error: ProviderError::ResponseError("boom".to_string()),
            }),
        };

        let source = err.source().expect("source");
        assert!(source.to_string().contains("p2"));
        assert!(err.is_retryable());
        assert_eq!(err.last_provider_failure().unwrap().provider, "p2");
    }

    #[test]
    fn test_configuration_failures_are_not_retryable() {
        assert!(!OrchestrationError::SecurityBlocked { reason: "x".to_string() }.is_retryable());
        assert!(!OrchestrationError::QuotaExceeded { spent: 1.0, tokens: 10 }.is_retryable());
    }

    #[test]
    fn test_deadlock_display_lists_tasks() {
        let err = OrchestrationError::SchedulerDeadlock {
            unresolved: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "Unsatisfiable task dependencies: a, b");
    }
}
