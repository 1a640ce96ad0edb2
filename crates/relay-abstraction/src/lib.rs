//! Provider abstraction layer for Relay.
//!
//! This crate defines the request/response data model and the contracts that
//! external collaborators (provider adapters, prompt security filters) must
//! satisfy. It contains no routing logic of its own.

pub mod provider;
pub mod request;
pub mod response;
pub mod security;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use provider::{ProviderAdapter, ProviderOutput, ProviderReply};
pub use request::{ChatMessage, Request, RequestKind, RequestOptions, Tier};
pub use response::{Payload, Response, RouteOutcome, StreamingChannel, TokenStream, TokenUsage};
pub use security::{PassthroughFilter, SecurityFilter, Validation};

/// How loudly a provider failure should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected, usually transient (rate limits, unsupported operations).
    Warning,
    /// Unexpected failure of the backend.
    Error,
}

/// Represents an error that can occur when a provider executes a request.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderError {
    /// An error occurred while sending the request (network, invalid request).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The backend answered with an error or an unusable body.
    #[error("Provider Response Error: {0}")]
    ResponseError(String),

    /// The backend asked us to slow down.
    #[error("Provider '{provider}' rate limited{}", retry_after_secs.map(|s| format!(" (retry after {}s)", s)).unwrap_or_default())]
    RateLimited {
        /// The provider tag.
        provider: String,
        /// Optional retry hint from the backend.
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },

    /// Provider-side quota exhausted (the provider account, not the session budget).
    #[error("Provider '{provider}' quota exceeded{}", message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    QuotaExceeded {
        /// The provider tag.
        provider: String,
        /// Optional error message from the provider.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// The adapter does not implement the operation needed for this request kind.
    #[error("Provider '{provider}' does not support {operation}")]
    Unsupported {
        /// The provider tag.
        provider: String,
        /// The operation name (e.g. "generate_video").
        operation: String,
    },

    /// The call observed its cancellation signal.
    #[error("Provider call cancelled")]
    Cancelled,

    /// Other unexpected errors.
    #[error("Other Provider Error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Severity used when the failure is published for observability.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::RateLimited { .. } | Self::Unsupported { .. } | Self::Cancelled => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }

    /// Creates an `Unsupported` error for the given provider and operation.
    #[must_use]
    pub fn unsupported(provider: &str, operation: &str) -> Self {
        Self::Unsupported { provider: provider.to_string(), operation: operation.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_display() {
        let err = ProviderError::RateLimited {
            provider: "openai".to_string(),
            retry_after_secs: Some(30),
        };
        assert_eq!(err.to_string(), "Provider 'openai' rate limited (retry after 30s)");
    }

    #[test]
    fn test_quota_display_without_message() {
        let err = ProviderError::QuotaExceeded { provider: "gemini".to_string(), message: None };
        assert_eq!(err.to_string(), "Provider 'gemini' quota exceeded");
    }

    #[test]
    fn test_severity() {
        assert_eq!(ProviderError::unsupported("a", "embed").severity(), Severity::Warning);
        assert_eq!(ProviderError::ResponseError("500".to_string()).severity(), Severity::Error);
    }
}
