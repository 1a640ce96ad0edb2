//! Pipeline steps: one provider bound to the operation a request kind needs.

use relay_abstraction::{
    ProviderAdapter, ProviderError, ProviderOutput, Request, RequestKind,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One entry of a fallback pipeline.
#[derive(Clone)]
pub struct PipelineStep {
    /// Tag of the provider.
    pub provider_tag: String,
    adapter: Arc<dyn ProviderAdapter>,
}

impl PipelineStep {
    /// Binds an adapter.
    #[must_use]
    pub fn new(adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self { provider_tag: adapter.tag().to_string(), adapter }
    }

    /// Name of the adapter operation used for a kind.
    #[must_use]
    pub fn operation(kind: RequestKind) -> &'static str {
        match kind {
            RequestKind::Text | RequestKind::Reasoning => "text_chat",
            RequestKind::Code => "code_completion",
            RequestKind::Image => "generate_image",
            RequestKind::Audio => "generate_audio",
            RequestKind::Video => "generate_video",
            RequestKind::ThreeD => "generate_model_3d",
            RequestKind::Vision => "analyze_image",
            RequestKind::Embedding => "embed",
        }
    }

    /// Executes the request against this step's provider.
    pub async fn execute(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<ProviderOutput, ProviderError> {
        let adapter = self.adapter.as_ref();
        let reply = match request.kind {
            RequestKind::Text | RequestKind::Reasoning => {
                return adapter.text_chat(request, cancel).await;
            }
            RequestKind::Code => adapter.code_completion(request, cancel).await,
            RequestKind::Image => adapter.generate_image(request, cancel).await,
            RequestKind::Audio => adapter.generate_audio(request, cancel).await,
            RequestKind::Video => adapter.generate_video(request, cancel).await,
            RequestKind::ThreeD => adapter.generate_model_3d(request, cancel).await,
            RequestKind::Vision => adapter.analyze_image(request, cancel).await,
            RequestKind::Embedding => adapter.embed(request, cancel).await,
        };
        reply.map(ProviderOutput::Complete)
    }
}

impl std::fmt::Debug for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStep").field("provider_tag", &self.provider_tag).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_abstraction::{Payload, ProviderReply};

    struct CodeOnly;

    #[async_trait]
    impl ProviderAdapter for CodeOnly {
        fn tag(&self) -> &str {
            "code-only"
        }

        fn supports(&self, kind: RequestKind) -> bool {
            kind == RequestKind::Code
        }

        async fn text_chat(
            &self,
            _request: &Request,
            _cancel: &CancellationToken,
        ) -> Result<ProviderOutput, ProviderError> {
            Err(ProviderError::unsupported(self.tag(), "text_chat"))
        }

        async fn code_completion(
            &self,
            request: &Request,
            _cancel: &CancellationToken,
        ) -> Result<ProviderReply, ProviderError> {
            Ok(ProviderReply::new(Payload::code(format!("// {}", request.prompt)), "coder"))
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_kind() {
        let step = PipelineStep::new(Arc::new(CodeOnly));
        let cancel = CancellationToken::new();

        let output = step.execute(&Request::new(RequestKind::Code, "sum"), &cancel).await.unwrap();
        match output {
            ProviderOutput::Complete(reply) => assert_eq!(reply.payload.code.as_deref(), Some("// sum")),
            ProviderOutput::Stream(_) => panic!("expected complete reply"),
        }

        let err = step.execute(&Request::new(RequestKind::Video, "x"), &cancel).await.unwrap_err();
        assert_eq!(err, ProviderError::unsupported("code-only", "generate_video"));
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(PipelineStep::operation(RequestKind::Reasoning), "text_chat");
        assert_eq!(PipelineStep::operation(RequestKind::ThreeD), "generate_model_3d");
    }
}
