//! Offline provider that answers every request kind without a network call.

use async_trait::async_trait;
use relay_abstraction::{
    Payload, ProviderAdapter, ProviderError, ProviderOutput, ProviderReply, Request, RequestKind,
    StreamingChannel, TokenUsage,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Model id reported by the echo provider.
const ECHO_MODEL: &str = "echo-1";

/// Dimension of echo embeddings.
const EMBEDDING_DIM: usize = 8;

/// An offline provider that echoes prompts back.
///
/// Serves every request kind: text and code echo the prompt, media kinds
/// return an `echo://` URL naming the prompt, embeddings are a byte
/// histogram. Used for local runs and tests.
#[derive(Debug, Clone)]
pub struct EchoProvider {
    tag: String,
    premium: bool,
}

impl EchoProvider {
    /// Creates an echo provider tagged `echo`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tag("echo")
    }

    /// Creates an echo provider with a custom tag.
    #[must_use]
    pub fn with_tag(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), premium: false }
    }

    /// Marks the provider as premium-capable.
    #[must_use]
    pub fn as_premium(mut self) -> Self {
        self.premium = true;
        self
    }

    fn check(&self, cancel: &CancellationToken) -> Result<(), ProviderError> {
        if cancel.is_cancelled() { Err(ProviderError::Cancelled) } else { Ok(()) }
    }

    fn usage(request: &Request, output: &str) -> TokenUsage {
        TokenUsage::new(count_tokens(&request.prompt), count_tokens(output))
    }

    fn media(&self, request: &Request) -> ProviderReply {
        let url = format!("echo://{}/{}", request.kind, slug(&request.prompt));
        ProviderReply::new(Payload::media(vec![url]), ECHO_MODEL)
            .with_usage(Self::usage(request, ""))
    }
}

impl Default for EchoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for EchoProvider {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn supports(&self, _kind: RequestKind) -> bool {
        true
    }

    fn premium(&self) -> bool {
        self.premium
    }

    async fn text_chat(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<ProviderOutput, ProviderError> {
        self.check(cancel)?;
        debug!(provider = %self.tag, prompt = %request.prompt, stream = request.options.stream, "Echoing prompt");

        if request.options.stream {
            let chunks: Vec<Result<String, ProviderError>> = request
                .prompt
                .split_inclusive(' ')
                .map(|chunk| Ok(chunk.to_string()))
                .collect();
            let stream = Box::pin(futures::stream::iter(chunks));
            return Ok(ProviderOutput::Stream(StreamingChannel::new(
                self.tag.clone(),
                ECHO_MODEL,
                stream,
            )));
        }

        Ok(ProviderOutput::Complete(
            ProviderReply::new(Payload::text(request.prompt.clone()), ECHO_MODEL)
                .with_usage(Self::usage(request, &request.prompt)),
        ))
    }

    async fn code_completion(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        self.check(cancel)?;
        Ok(ProviderReply::new(Payload::code(request.prompt.clone()), ECHO_MODEL)
            .with_usage(Self::usage(request, &request.prompt)))
    }

    async fn generate_image(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        self.check(cancel)?;
        Ok(self.media(request))
    }

    async fn generate_video(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        self.check(cancel)?;
        Ok(self.media(request))
    }

    async fn generate_audio(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        self.check(cancel)?;
        Ok(self.media(request))
    }

    async fn generate_model_3d(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        self.check(cancel)?;
        Ok(self.media(request))
    }

    async fn analyze_image(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        self.check(cancel)?;
        let text = format!("Image analysis: {}", request.prompt);
        let usage = Self::usage(request, &text);
        Ok(ProviderReply::new(Payload::text(text), ECHO_MODEL).with_usage(usage))
    }

    async fn embed(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        self.check(cancel)?;
        let mut vector = vec![0.0_f32; EMBEDDING_DIM];
        for byte in request.prompt.bytes() {
            vector[usize::from(byte) % EMBEDDING_DIM] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        let payload = Payload { embedding: Some(vector), ..Payload::default() };
        Ok(ProviderReply::new(payload, ECHO_MODEL).with_usage(Self::usage(request, "")))
    }
}

/// Whitespace word count.
fn count_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// Lowercase alphanumeric slug of a prompt.
fn slug(prompt: &str) -> String {
    let words: Vec<String> = prompt
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect();
    if words.is_empty() { "untitled".to_string() } else { words.join("-") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_text_echo() {
        let provider = EchoProvider::new();
        let output =
            provider.text_chat(&Request::text("hello world"), &CancellationToken::new()).await.unwrap();
        match output {
            ProviderOutput::Complete(reply) => {
                assert_eq!(reply.payload.text.as_deref(), Some("hello world"));
                assert_eq!(reply.usage, Some(TokenUsage::new(2, 2)));
            }
            ProviderOutput::Stream(_) => panic!("expected complete reply"),
        }
    }

    #[tokio::test]
    async fn test_streaming_echo() {
        let provider = EchoProvider::new();
        let output = provider
            .text_chat(&Request::text("one two three").streaming(), &CancellationToken::new())
            .await
            .unwrap();
        match output {
            ProviderOutput::Stream(channel) => {
                assert_eq!(channel.collect_text().await.unwrap(), "one two three");
            }
            ProviderOutput::Complete(_) => panic!("expected stream"),
        }
    }

    #[tokio::test]
    async fn test_media_url() {
        let provider = EchoProvider::new();
        let reply = provider
            .generate_image(&Request::new(RequestKind::Image, "A red Fox!"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.payload.media_urls, vec!["echo://image/a-red-fox".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_token_is_honored() {
        let provider = EchoProvider::new();
        let token = CancellationToken::new();
        token.cancel();
        let err = provider.code_completion(&Request::text("x"), &token).await.unwrap_err();
        assert_eq!(err, ProviderError::Cancelled);
    }

    #[tokio::test]
    async fn test_embedding_is_normalized() {
        let provider = EchoProvider::new();
        let reply = provider
            .embed(&Request::new(RequestKind::Embedding, "abc"), &CancellationToken::new())
            .await
            .unwrap();
        let vector = reply.payload.embedding.unwrap();
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
