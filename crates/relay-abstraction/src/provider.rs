//! Provider adapter contract.

use crate::request::Request;
use crate::response::{Payload, StreamingChannel, TokenUsage};
use crate::{ProviderError, RequestKind};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A complete reply from a provider, before cost annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    /// The content.
    pub payload: Payload,
    /// The model that produced it.
    pub model_id: String,
    /// Usage, when the backend reports it.
    pub usage: Option<TokenUsage>,
}

impl ProviderReply {
    /// Creates a reply without usage information.
    #[must_use]
    pub fn new(payload: Payload, model_id: impl Into<String>) -> Self {
        Self { payload, model_id: model_id.into(), usage: None }
    }

    /// Attaches reported usage.
    #[must_use]
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// What a provider call produced.
#[derive(Debug)]
pub enum ProviderOutput {
    /// A complete reply.
    Complete(ProviderReply),
    /// A streaming channel (chat endpoints only).
    Stream(StreamingChannel),
}

/// One backend capable of fulfilling some subset of request kinds.
///
/// Only `text_chat` is mandatory. The other operations default to
/// `ProviderError::Unsupported`, and `supports` should stay consistent
/// with what is overridden. All adapters must be `Send + Sync` so the
/// router can share them across concurrent requests.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable tag used for registration, gating, pricing and telemetry.
    fn tag(&self) -> &str;

    /// Whether this adapter can serve the kind.
    fn supports(&self, kind: RequestKind) -> bool;

    /// Whether this adapter should be preferred for premium-tier requests.
    fn premium(&self) -> bool {
        false
    }

    /// Chat / text completion. May return a streaming channel when
    /// `request.options.stream` is set.
    async fn text_chat(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<ProviderOutput, ProviderError>;

    /// Image generation.
    async fn generate_image(
        &self,
        _request: &Request,
        _cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        Err(ProviderError::unsupported(self.tag(), "generate_image"))
    }

    /// Code completion.
    async fn code_completion(
        &self,
        _request: &Request,
        _cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        Err(ProviderError::unsupported(self.tag(), "code_completion"))
    }

    /// Video generation.
    async fn generate_video(
        &self,
        _request: &Request,
        _cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        Err(ProviderError::unsupported(self.tag(), "generate_video"))
    }

    /// Audio generation.
    async fn generate_audio(
        &self,
        _request: &Request,
        _cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        Err(ProviderError::unsupported(self.tag(), "generate_audio"))
    }

    /// 3D asset generation.
    async fn generate_model_3d(
        &self,
        _request: &Request,
        _cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        Err(ProviderError::unsupported(self.tag(), "generate_model_3d"))
    }

    /// Image analysis.
    async fn analyze_image(
        &self,
        _request: &Request,
        _cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        Err(ProviderError::unsupported(self.tag(), "analyze_image"))
    }

    /// Embedding.
    async fn embed(
        &self,
        _request: &Request,
        _cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        Err(ProviderError::unsupported(self.tag(), "embed"))
    }
}
