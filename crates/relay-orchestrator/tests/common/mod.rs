//! Shared mock providers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use relay_abstraction::{
    Payload, ProviderAdapter, ProviderError, ProviderOutput, ProviderReply, Request, RequestKind,
    StreamingChannel, TokenUsage,
};
use relay_orchestrator::{JobBus, ProviderRegistry, QuotaGuard, RequestRouter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// What a mock provider does when called.
#[derive(Clone)]
pub enum Behavior {
    /// Answer with this text.
    Succeed(String),
    /// Fail with this error.
    Fail(ProviderError),
    /// Open a stream yielding these chunks.
    Stream(Vec<String>),
}

/// Mock provider with configurable behavior and a call counter.
pub struct MockProvider {
    tag: String,
    kinds: Vec<RequestKind>,
    premium: bool,
    behavior: Behavior,
    fail_marker: Option<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            kinds: vec![RequestKind::Text, RequestKind::Code],
            premium: false,
            behavior: Behavior::Succeed(format!("Response from {}", tag)),
            fail_marker: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_success(mut self, text: &str) -> Self {
        self.behavior = Behavior::Succeed(text.to_string());
        self
    }

    pub fn with_error(mut self, error: ProviderError) -> Self {
        self.behavior = Behavior::Fail(error);
        self
    }

    pub fn with_stream(mut self, chunks: &[&str]) -> Self {
        self.behavior = Behavior::Stream(chunks.iter().map(|c| (*c).to_string()).collect());
        self
    }

    /// Fails any request whose prompt contains `marker`; otherwise echoes the prompt.
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    pub fn with_kinds(mut self, kinds: &[RequestKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn premium(mut self) -> Self {
        self.premium = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, request: &Request) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).push(request.prompt.clone());
    }

    fn reply(&self, payload: Payload) -> ProviderReply {
        ProviderReply::new(payload, format!("{}-model", self.tag)).with_usage(TokenUsage::new(10, 5))
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn supports(&self, kind: RequestKind) -> bool {
        self.kinds.contains(&kind)
    }

    fn premium(&self) -> bool {
        self.premium
    }

    async fn text_chat(
        &self,
        request: &Request,
        _cancel: &CancellationToken,
    ) -> Result<ProviderOutput, ProviderError> {
        self.record(request);
        if let Some(marker) = &self.fail_marker {
            if request.prompt.contains(marker.as_str()) {
                return Err(response_error(&format!("refused '{}'", request.prompt)));
            }
            return Ok(ProviderOutput::Complete(self.reply(Payload::text(request.prompt.clone()))));
        }
        match &self.behavior {
            Behavior::Succeed(text) => {
                Ok(ProviderOutput::Complete(self.reply(Payload::text(text.clone()))))
            }
            Behavior::Fail(error) => Err(error.clone()),
            Behavior::Stream(chunks) => {
                let items: Vec<Result<String, ProviderError>> =
                    chunks.iter().cloned().map(Ok).collect();
                Ok(ProviderOutput::Stream(StreamingChannel::new(
                    self.tag.clone(),
                    format!("{}-model", self.tag),
                    Box::pin(futures::stream::iter(items)),
                )))
            }
        }
    }

    async fn code_completion(
        &self,
        request: &Request,
        _cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        self.record(request);
        match &self.behavior {
            Behavior::Succeed(text) => Ok(self.reply(Payload::code(text.clone()))),
            Behavior::Fail(error) => Err(error.clone()),
            Behavior::Stream(chunks) => Ok(self.reply(Payload::code(chunks.concat()))),
        }
    }
}

/// Builds a router over the given providers with an unlimited budget.
pub fn router_with(providers: &[Arc<MockProvider>]) -> RequestRouter {
    router_with_quota(providers, QuotaGuard::unlimited())
}

/// Builds a router over the given providers with the given budget.
pub fn router_with_quota(providers: &[Arc<MockProvider>], quota: QuotaGuard) -> RequestRouter {
    let registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(Arc::clone(provider) as Arc<dyn ProviderAdapter>);
    }
    RequestRouter::new(Arc::new(registry), Arc::new(quota), Arc::new(JobBus::new()))
}

pub fn response_error(message: &str) -> ProviderError {
    ProviderError::ResponseError(message.to_string())
}
