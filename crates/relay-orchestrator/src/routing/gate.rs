//! Provider gates decide whether a capable provider may join a pipeline.

use relay_abstraction::Request;
use std::collections::HashSet;
use std::sync::Arc;

/// An external rate / cost / health gate.
///
/// `permits` is asked once per candidate while a pipeline is built. The
/// router reports the outcome of every attempt back through the
/// `record_*` hooks.
pub trait ProviderGate: Send + Sync {
    /// Whether the provider may serve this request right now.
    fn permits(&self, provider: &str, request: &Request) -> bool;

    /// Called after the provider served a request.
    fn record_success(&self, _provider: &str) {}

    /// Called after the provider failed a request.
    fn record_failure(&self, _provider: &str) {}
}

/// Permits every provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ProviderGate for AllowAll {
    fn permits(&self, _provider: &str, _request: &Request) -> bool {
        true
    }
}

/// Excludes a fixed set of providers.
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    denied: HashSet<String>,
}

impl DenyList {
    /// Creates a deny list from provider tags.
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { denied: tags.into_iter().map(Into::into).collect() }
    }
}

impl ProviderGate for DenyList {
    fn permits(&self, provider: &str, _request: &Request) -> bool {
        !self.denied.contains(provider)
    }
}

/// All gates must permit; outcomes are reported to every gate.
#[derive(Default, Clone)]
pub struct GateSet {
    gates: Vec<Arc<dyn ProviderGate>>,
}

impl GateSet {
    /// Creates an empty set, which permits everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a gate.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn ProviderGate>) -> Self {
        self.gates.push(gate);
        self
    }

    /// Number of gates.
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    /// Whether the set has no gates.
    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

impl ProviderGate for GateSet {
    fn permits(&self, provider: &str, request: &Request) -> bool {
        self.gates.iter().all(|gate| gate.permits(provider, request))
    }

    fn record_success(&self, provider: &str) {
        for gate in &self.gates {
            gate.record_success(provider);
        }
    }

    fn record_failure(&self, provider: &str) {
        for gate in &self.gates {
            gate.record_failure(provider);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        failures: AtomicUsize,
    }

    impl ProviderGate for Counting {
        fn permits(&self, _provider: &str, _request: &Request) -> bool {
            true
        }

        fn record_failure(&self, _provider: &str) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_deny_list() {
        let gate = DenyList::new(["video-x"]);
        let request = Request::text("x");
        assert!(!gate.permits("video-x", &request));
        assert!(gate.permits("openai", &request));
    }

    #[test]
    fn test_gate_set_requires_all_and_fans_out_records() {
        let counting = Arc::new(Counting::default());
        let set = GateSet::new()
            .with_gate(Arc::new(AllowAll))
            .with_gate(Arc::new(DenyList::new(["b"])))
            .with_gate(counting.clone());

        let request = Request::text("x");
        assert!(set.permits("a", &request));
        assert!(!set.permits("b", &request));

        set.record_failure("a");
        assert_eq!(counting.failures.load(Ordering::SeqCst), 1);
        assert_eq!(set.len(), 3);
    }
}
