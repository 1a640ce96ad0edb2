//! Provider registry: the strategy map of adapters keyed by tag.

use relay_abstraction::{ProviderAdapter, Request, Tier};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Registered adapters in rank order.
///
/// Registration order is the rank. Re-registering a tag replaces the adapter
/// in place and keeps its rank.
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: RwLock<Vec<Arc<dyn ProviderAdapter>>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its tag.
    pub fn register(&self, adapter: Arc<dyn ProviderAdapter>) {
        let mut adapters = self.adapters.write().unwrap_or_else(PoisonError::into_inner);
        let tag = adapter.tag().to_string();
        if let Some(slot) = adapters.iter_mut().find(|existing| existing.tag() == tag) {
            warn!(provider = %tag, "Provider already registered, replacing adapter");
            *slot = adapter;
        } else {
            debug!(provider = %tag, rank = adapters.len(), "Registered provider");
            adapters.push(adapter);
        }
    }

    /// Builder form of [`ProviderRegistry::register`].
    #[must_use]
    pub fn with_provider(self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Removes an adapter. Returns false if the tag is unknown.
    pub fn unregister(&self, tag: &str) -> bool {
        let mut adapters = self.adapters.write().unwrap_or_else(PoisonError::into_inner);
        let before = adapters.len();
        adapters.retain(|adapter| adapter.tag() != tag);
        adapters.len() != before
    }

    /// Looks up an adapter by tag.
    pub fn get(&self, tag: &str) -> Option<Arc<dyn ProviderAdapter>> {
        let adapters = self.adapters.read().unwrap_or_else(PoisonError::into_inner);
        adapters.iter().find(|adapter| adapter.tag() == tag).cloned()
    }

    /// Registered tags in rank order.
    pub fn tags(&self) -> Vec<String> {
        let adapters = self.adapters.read().unwrap_or_else(PoisonError::into_inner);
        adapters.iter().map(|adapter| adapter.tag().to_string()).collect()
    }

    /// Number of registered adapters.
    pub fn len(&self) -> usize {
        self.adapters.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no adapter is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adapters able to serve the request, in the order they should be tried.
    ///
    /// Premium-tier requests move premium adapters to the front; the sort is
    /// stable, so rank decides within each group.
    pub fn candidates(&self, request: &Request) -> Vec<Arc<dyn ProviderAdapter>> {
        let adapters = self.adapters.read().unwrap_or_else(PoisonError::into_inner);
        let mut candidates: Vec<Arc<dyn ProviderAdapter>> =
            adapters.iter().filter(|adapter| adapter.supports(request.kind)).cloned().collect();

        if request.tier == Tier::Premium {
            candidates.sort_by_key(|adapter| !adapter.premium());
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_abstraction::{
        Payload, ProviderError, ProviderOutput, ProviderReply, RequestKind,
    };
    use tokio_util::sync::CancellationToken;

    struct Stub {
        tag: &'static str,
        kinds: Vec<RequestKind>,
        premium: bool,
    }

    #[async_trait]
    impl ProviderAdapter for Stub {
        fn tag(&self) -> &str {
            self.tag
        }

        fn supports(&self, kind: RequestKind) -> bool {
            self.kinds.contains(&kind)
        }

        fn premium(&self) -> bool {
            self.premium
        }

        async fn text_chat(
            &self,
            _request: &Request,
            _cancel: &CancellationToken,
        ) -> Result<ProviderOutput, ProviderError> {
            Ok(ProviderOutput::Complete(ProviderReply::new(Payload::text("ok"), "stub")))
        }
    }

    fn stub(tag: &'static str, kinds: &[RequestKind], premium: bool) -> Arc<dyn ProviderAdapter> {
        Arc::new(Stub { tag, kinds: kinds.to_vec(), premium })
    }

    #[test]
    fn test_candidates_filter_by_kind_in_rank_order() {
        let registry = ProviderRegistry::new()
            .with_provider(stub("a", &[RequestKind::Text], false))
            .with_provider(stub("b", &[RequestKind::Image], false))
            .with_provider(stub("c", &[RequestKind::Text, RequestKind::Image], false));

        let tags: Vec<_> = registry
            .candidates(&Request::new(RequestKind::Image, "x"))
            .iter()
            .map(|a| a.tag().to_string())
            .collect();
        assert_eq!(tags, vec!["b", "c"]);
    }

    #[test]
    fn test_premium_tier_prefers_premium_providers() {
        let registry = ProviderRegistry::new()
            .with_provider(stub("cheap", &[RequestKind::Text], false))
            .with_provider(stub("fancy", &[RequestKind::Text], true))
            .with_provider(stub("cheap2", &[RequestKind::Text], false));

        let standard: Vec<_> =
            registry.candidates(&Request::text("x")).iter().map(|a| a.tag().to_string()).collect();
        assert_eq!(standard, vec!["cheap", "fancy", "cheap2"]);

        let premium: Vec<_> = registry
            .candidates(&Request::text("x").with_tier(Tier::Premium))
            .iter()
            .map(|a| a.tag().to_string())
            .collect();
        assert_eq!(premium, vec!["fancy", "cheap", "cheap2"]);
    }

    #[test]
    fn test_reregistration_keeps_rank() {
        let registry = ProviderRegistry::new()
            .with_provider(stub("a", &[RequestKind::Text], false))
            .with_provider(stub("b", &[RequestKind::Text], false));
        registry.register(stub("a", &[RequestKind::Code], false));

        assert_eq!(registry.tags(), vec!["a", "b"]);
        assert!(registry.get("a").unwrap().supports(RequestKind::Code));
        assert!(registry.unregister("a"));
        assert_eq!(registry.len(), 1);
    }
}
