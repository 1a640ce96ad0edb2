//! Prompt security contract.

/// Outcome of validating a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// The prompt may be dispatched unchanged.
    Valid,
    /// Soft violation: dispatch the sanitized prompt instead.
    Sanitized(String),
    /// Hard violation: never dispatch. Carries the reason.
    Blocked(String),
}

/// Validates and sanitizes prompts before any provider sees them.
///
/// Called synchronously on every routed request, including each bundle
/// sub-request.
pub trait SecurityFilter: Send + Sync {
    /// Validates a prompt.
    fn validate(&self, prompt: &str) -> Validation;
}

/// A filter that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFilter;

impl SecurityFilter for PassthroughFilter {
    fn validate(&self, _prompt: &str) -> Validation {
        Validation::Valid
    }
}
