//! Request router with ranked fallback.

use super::cost_model::CostModel;
use super::gate::{AllowAll, DenyList, GateSet, ProviderGate};
use super::circuit_breaker::CircuitBreaker;
use super::pipeline::PipelineStep;
use super::registry::ProviderRegistry;
use crate::config::{ConfigError, OrchestratorConfig};
use crate::error::{OrchestrationError, ProviderFailure, Result};
use crate::jobs::{JobBus, JobDescriptor, JobEvent, JobKind};
use crate::quota::QuotaGuard;
use crate::security::PromptFilter;
use futures::future::BoxFuture;
use relay_abstraction::{
    PassthroughFilter, Payload, ProviderError, ProviderOutput, Request, RequestKind,
    RequestOptions, Response, RouteOutcome, SecurityFilter, StreamingChannel, TokenUsage,
    Validation,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default maximum bundle nesting depth.
pub const DEFAULT_MAX_BUNDLE_DEPTH: usize = 4;

/// Provider tag of composite bundle responses.
pub const BUNDLE_PROVIDER_TAG: &str = "bundle";

/// Routes requests through a ranked, gated provider pipeline.
///
/// The router owns no per-request state. Session counters live in the
/// injected [`QuotaGuard`], so one router can serve many concurrent requests.
pub struct RequestRouter {
    registry: Arc<ProviderRegistry>,
    quota: Arc<QuotaGuard>,
    jobs: Arc<JobBus>,
    filter: Arc<dyn SecurityFilter>,
    gate: Arc<dyn ProviderGate>,
    cost_model: Arc<CostModel>,
    max_bundle_depth: usize,
}

impl RequestRouter {
    /// Creates a router with a passthrough filter, no gates and default pricing.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, quota: Arc<QuotaGuard>, jobs: Arc<JobBus>) -> Self {
        Self {
            registry,
            quota,
            jobs,
            filter: Arc::new(PassthroughFilter),
            gate: Arc::new(AllowAll),
            cost_model: Arc::new(CostModel::new()),
            max_bundle_depth: DEFAULT_MAX_BUNDLE_DEPTH,
        }
    }

    /// Creates a router from configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` if the security settings do not compile.
    pub fn from_config(
        config: &OrchestratorConfig,
        registry: Arc<ProviderRegistry>,
        jobs: Arc<JobBus>,
    ) -> std::result::Result<Self, ConfigError> {
        let mut gates = GateSet::new();
        if !config.routing.disabled_providers.is_empty() {
            gates = gates.with_gate(Arc::new(DenyList::new(
                config.routing.disabled_providers.iter().cloned(),
            )));
        }
        if let Some(ref breaker) = config.routing.circuit_breaker {
            gates = gates.with_gate(Arc::new(CircuitBreaker::from_settings(breaker)));
        }

        Ok(Self::new(registry, Arc::new(QuotaGuard::new(config.budget.clone())), jobs)
            .with_filter(Arc::new(PromptFilter::from_settings(&config.security)?))
            .with_gate(Arc::new(gates))
            .with_cost_model(CostModel::from_entries(&config.routing.pricing))
            .with_max_bundle_depth(config.routing.max_bundle_depth))
    }

    /// Sets the security filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Arc<dyn SecurityFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the provider gate.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn ProviderGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Sets the cost model.
    #[must_use]
    pub fn with_cost_model(mut self, cost_model: CostModel) -> Self {
        self.cost_model = Arc::new(cost_model);
        self
    }

    /// Sets the maximum bundle nesting depth.
    #[must_use]
    pub fn with_max_bundle_depth(mut self, depth: usize) -> Self {
        self.max_bundle_depth = depth;
        self
    }

    /// The provider registry.
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// The session quota guard.
    pub fn quota(&self) -> &Arc<QuotaGuard> {
        &self.quota
    }

    /// The job bus.
    pub fn jobs(&self) -> &Arc<JobBus> {
        &self.jobs
    }

    /// Routes a request to the first provider that fulfils it.
    ///
    /// # Errors
    /// - `SecurityBlocked` / `QuotaExceeded` before any provider is invoked
    /// - `BundleTooDeep` for over-nested bundles
    /// - `Cancelled` if the request's abort signal fires
    /// - `PipelineExhausted` when no candidate succeeded
    pub async fn route(&self, request: Request) -> Result<RouteOutcome> {
        self.route_at_depth(request, 0).await
    }

    /// Routes a request with streaming disabled and returns the complete response.
    ///
    /// A provider that streams anyway is drained into a text response.
    ///
    /// # Errors
    /// Same as [`RequestRouter::route`].
    pub async fn complete(&self, mut request: Request) -> Result<Response> {
        request.options.stream = false;
        let kind = request.kind;
        let input_chars = request.input_chars();
        let started = Instant::now();

        match self.route(request).await? {
            RouteOutcome::Complete(response) => Ok(response),
            RouteOutcome::Streaming(channel) => {
                self.drain(kind, input_chars, started, channel).await
            }
        }
    }

    fn route_at_depth(&self, mut request: Request, depth: usize) -> BoxFuture<'_, Result<RouteOutcome>> {
        Box::pin(async move {
            match self.filter.validate(&request.prompt) {
                Validation::Valid => {}
                Validation::Sanitized(prompt) => {
                    debug!(kind = %request.kind, "Prompt sanitized before dispatch");
                    request.prompt = prompt;
                }
                Validation::Blocked(reason) => {
                    warn!(kind = %request.kind, reason = %reason, "Request blocked by security filter");
                    return Err(OrchestrationError::SecurityBlocked { reason });
                }
            }

            if request.is_bundle() {
                if depth >= self.max_bundle_depth {
                    return Err(OrchestrationError::BundleTooDeep { max_depth: self.max_bundle_depth });
                }
                return self.route_bundle(request, depth).await.map(RouteOutcome::Complete);
            }

            if self.quota.is_over_budget() {
                let (spent, tokens) = (self.quota.spent(), self.quota.tokens_used());
                warn!(spent = spent, tokens = tokens, "Request rejected: session budget exhausted");
                return Err(OrchestrationError::QuotaExceeded { spent, tokens });
            }

            let pipeline = self.build_pipeline(&request);
            if pipeline.is_empty() {
                warn!(kind = %request.kind, "No permitted provider supports this request kind");
                return Err(OrchestrationError::PipelineExhausted {
                    kind: request.kind,
                    attempted: 0,
                    last: None,
                });
            }

            self.execute_pipeline(&request, &pipeline).await
        })
    }

    /// Capable providers in rank order, minus those the gate excludes.
    fn build_pipeline(&self, request: &Request) -> Vec<PipelineStep> {
        self.registry
            .candidates(request)
            .into_iter()
            .filter(|adapter| {
                let permitted = self.gate.permits(adapter.tag(), request);
                if !permitted {
                    debug!(provider = adapter.tag(), "Provider excluded by gate");
                }
                permitted
            })
            .map(PipelineStep::new)
            .collect()
    }

    async fn execute_pipeline(&self, request: &Request, pipeline: &[PipelineStep]) -> Result<RouteOutcome> {
        let chain: Vec<&str> = pipeline.iter().map(|step| step.provider_tag.as_str()).collect();
        let job = self.jobs.register_job(
            JobDescriptor::new(
                JobKind::Request,
                format!("{} request via {}", request.kind, chain.join(" > ")),
            ),
            request.options.abort.as_ref(),
        );
        let token = job.token().clone();

        let mut attempted = 0;
        let mut last: Option<ProviderFailure> = None;

        for step in pipeline {
            if token.is_cancelled() {
                debug!(job_id = job.id(), "Request cancelled before next provider");
                return Err(OrchestrationError::Cancelled);
            }

            attempted += 1;
            let started = Instant::now();
            debug!(
                provider = %step.provider_tag,
                kind = %request.kind,
                operation = PipelineStep::operation(request.kind),
                "Trying provider"
            );

            let result = tokio::select! {
                biased;
                () = token.cancelled() => Err(ProviderError::Cancelled),
                result = step.execute(request, &token) => result,
            };

            match result {
                Ok(ProviderOutput::Stream(channel)) => {
                    self.gate.record_success(&step.provider_tag);
                    info!(provider = %step.provider_tag, model_id = %channel.model_id, "Streaming response opened");
                    job.succeed();
                    return Ok(RouteOutcome::Streaming(channel));
                }
                Ok(ProviderOutput::Complete(reply)) => {
                    let latency = started.elapsed();
                    let usage = CostModel::usage_for(request, &reply);
                    let cost =
                        self.cost_model.cost(&step.provider_tag, &reply.model_id, request.kind, &usage);
                    self.gate.record_success(&step.provider_tag);
                    self.quota.record_usage(usage.total(), cost);

                    info!(
                        provider = %step.provider_tag,
                        model_id = %reply.model_id,
                        kind = %request.kind,
                        latency_ms = latency.as_millis() as u64,
                        tokens = usage.total(),
                        cost = cost,
                        "Request fulfilled"
                    );
                    job.succeed();

                    return Ok(RouteOutcome::Complete(Response {
                        payload: reply.payload,
                        provider_tag: step.provider_tag.clone(),
                        model_id: reply.model_id,
                        latency,
                        tokens_used: usage.total(),
                        cost,
                    }));
                }
                Err(error) => {
                    if token.is_cancelled() {
                        debug!(provider = %step.provider_tag, "Provider call cancelled");
                        return Err(OrchestrationError::Cancelled);
                    }

                    self.gate.record_failure(&step.provider_tag);
                    let severity = error.severity();
                    warn!(
                        provider = %step.provider_tag,
                        error = %error,
                        severity = ?severity,
                        "Provider failed, falling back"
                    );
                    job.dispatch_event(JobEvent::ProviderFailed {
                        job_id: job.id().to_string(),
                        provider: step.provider_tag.clone(),
                        error: error.to_string(),
                        severity,
                    });
                    last = Some(ProviderFailure { provider: step.provider_tag.clone(), error });
                }
            }
        }

        warn!(kind = %request.kind, attempted = attempted, "All providers failed");
        Err(OrchestrationError::PipelineExhausted { kind: request.kind, attempted, last })
    }

    /// Routes every sub-request in order and merges the results.
    ///
    /// Each sub-request is routed (and recorded against the budget) on its
    /// own; the composite is not recorded again.
    async fn route_bundle(&self, request: Request, depth: usize) -> Result<Response> {
        let started = Instant::now();
        let outer = request.options;
        let count = request.bundle.len();
        debug!(sub_requests = count, depth = depth, "Routing bundle");

        let mut payload = Payload::default();
        let mut models = Vec::with_capacity(count);
        let mut tokens_used = 0;
        let mut cost = 0.0;

        for mut sub in request.bundle {
            sub.options = inherit_options(&outer, sub.options);
            let kind = sub.kind;
            let input_chars = sub.input_chars();
            let sub_started = Instant::now();

            let response = match self.route_at_depth(sub, depth + 1).await? {
                RouteOutcome::Complete(response) => response,
                RouteOutcome::Streaming(channel) => {
                    self.drain(kind, input_chars, sub_started, channel).await?
                }
            };

            payload.merge(response.payload);
            models.push(response.model_id);
            tokens_used += response.tokens_used;
            cost += response.cost;
        }

        info!(sub_requests = count, tokens = tokens_used, cost = cost, "Bundle fulfilled");

        Ok(Response {
            payload,
            provider_tag: BUNDLE_PROVIDER_TAG.to_string(),
            model_id: models.join("+"),
            latency: started.elapsed(),
            tokens_used,
            cost,
        })
    }

    /// Collects a streaming channel into a complete text response.
    async fn drain(
        &self,
        kind: RequestKind,
        input_chars: usize,
        started: Instant,
        channel: StreamingChannel,
    ) -> Result<Response> {
        let provider_tag = channel.provider_tag.clone();
        let model_id = channel.model_id.clone();

        let text = channel.collect_text().await.map_err(|error| {
            OrchestrationError::PipelineExhausted {
                kind,
                attempted: 1,
                last: Some(ProviderFailure { provider: provider_tag.clone(), error }),
            }
        })?;

        let usage = TokenUsage::new(
            CostModel::estimate_tokens(input_chars),
            CostModel::estimate_tokens(text.chars().count()),
        );
        let cost = self.cost_model.cost(&provider_tag, &model_id, kind, &usage);
        self.quota.record_usage(usage.total(), cost);

        Ok(Response {
            payload: Payload::text(text),
            provider_tag,
            model_id,
            latency: started.elapsed(),
            tokens_used: usage.total(),
            cost,
        })
    }
}

/// Sub-requests share the outer abort signal and provider knobs, but never stream.
fn inherit_options(outer: &RequestOptions, mut own: RequestOptions) -> RequestOptions {
    own.stream = false;
    if own.abort.is_none() {
        own.abort.clone_from(&outer.abort);
    }
    for (key, value) in &outer.extra {
        own.extra.entry(key.clone()).or_insert_with(|| value.clone());
    }
    own
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_abstraction::{ProviderAdapter, ProviderReply};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Records the prompts it receives and answers with their text.
    #[derive(Default)]
    struct Recorder {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProviderAdapter for Recorder {
        fn tag(&self) -> &str {
            "recorder"
        }

        fn supports(&self, _kind: RequestKind) -> bool {
            true
        }

        async fn text_chat(
            &self,
            request: &Request,
            _cancel: &CancellationToken,
        ) -> std::result::Result<ProviderOutput, ProviderError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            Ok(ProviderOutput::Complete(ProviderReply::new(Payload::text(request.prompt.clone()), "rec-1")))
        }

        async fn generate_image(
            &self,
            request: &Request,
            _cancel: &CancellationToken,
        ) -> std::result::Result<ProviderReply, ProviderError> {
            Ok(ProviderReply::new(
                Payload::media(vec![format!("https://img/{}.png", request.prompt)]),
                "rec-img",
            ))
        }
    }

    fn router_with(adapter: Arc<dyn ProviderAdapter>) -> RequestRouter {
        let registry = Arc::new(ProviderRegistry::new().with_provider(adapter));
        RequestRouter::new(registry, Arc::new(QuotaGuard::unlimited()), Arc::new(JobBus::new()))
    }

    #[tokio::test]
    async fn test_sanitized_prompt_is_dispatched() {
        let recorder = Arc::new(Recorder::default());
        let router = router_with(recorder.clone()).with_filter(Arc::new(PromptFilter::default()));

        let key = format!("AKIA{}", "B".repeat(16));
        router.complete(Request::text(format!("deploy with {}", key))).await.unwrap();

        let prompts = recorder.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(!prompts[0].contains(&key));
    }

    #[tokio::test]
    async fn test_bundle_merges_sub_responses() {
        let router = router_with(Arc::new(Recorder::default()));
        let bundle = Request::text("")
            .with_sub_request(Request::text("caption"))
            .with_sub_request(Request::new(RequestKind::Image, "fox"));

        let response = router.complete(bundle).await.unwrap();
        assert_eq!(response.provider_tag, BUNDLE_PROVIDER_TAG);
        assert_eq!(response.model_id, "rec-1+rec-img");
        assert_eq!(response.payload.text.as_deref(), Some("caption"));
        assert_eq!(response.payload.media_urls, vec!["https://img/fox.png".to_string()]);
        assert_eq!(router.quota().request_count(), 2);
    }

    #[tokio::test]
    async fn test_bundle_depth_limit() {
        let router = router_with(Arc::new(Recorder::default())).with_max_bundle_depth(1);
        let nested = Request::text("")
            .with_sub_request(Request::text("").with_sub_request(Request::text("inner")));

        let err = router.route(nested).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::BundleTooDeep { max_depth: 1 }));
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let registry = Arc::new(ProviderRegistry::new());
        let router =
            RequestRouter::new(registry, Arc::new(QuotaGuard::unlimited()), Arc::new(JobBus::new()));

        let err = router.route(Request::text("hello")).await.unwrap_err();
        match err {
            OrchestrationError::PipelineExhausted { attempted, last, .. } => {
                assert_eq!(attempted, 0);
                assert!(last.is_none());
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_job_is_unregistered_after_route() {
        let router = router_with(Arc::new(Recorder::default()));
        router.complete(Request::text("hi")).await.unwrap();
        assert!(router.jobs().active_jobs().is_empty());
    }

    #[test]
    fn test_inherit_options() {
        let mut outer = RequestOptions { stream: true, ..RequestOptions::default() };
        outer.extra.insert("temperature".to_string(), serde_json::json!(0.2));
        outer.abort = Some(CancellationToken::new());

        let mut own = RequestOptions::default();
        own.extra.insert("temperature".to_string(), serde_json::json!(0.9));

        let merged = inherit_options(&outer, own);
        assert!(!merged.stream);
        assert!(merged.abort.is_some());
        assert_eq!(merged.extra["temperature"], serde_json::json!(0.9));
    }
}
