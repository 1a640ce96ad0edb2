//! Request routing with ranked provider fallback.
//!
//! A request is validated, checked against the session budget, and then tried
//! against every permitted provider that supports its kind, in rank order,
//! until one succeeds.

pub mod circuit_breaker;
pub mod cost_model;
pub mod gate;
pub mod pipeline;
pub mod registry;
pub mod router;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use cost_model::{CostModel, Pricing};
pub use gate::{AllowAll, DenyList, GateSet, ProviderGate};
pub use pipeline::PipelineStep;
pub use registry::ProviderRegistry;
pub use router::{BUNDLE_PROVIDER_TAG, DEFAULT_MAX_BUNDLE_DEPTH, RequestRouter};
