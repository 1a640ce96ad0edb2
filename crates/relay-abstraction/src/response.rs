//! Response data model.

use crate::ProviderError;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Token usage reported by a provider or estimated by the router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub prompt_tokens: u64,
    /// Tokens in the completion.
    pub completion_tokens: u64,
}

impl TokenUsage {
    /// Creates a usage record.
    #[must_use]
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self { prompt_tokens, completion_tokens }
    }

    /// Total tokens.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// The useful content of a response.
///
/// Single-kind responses fill one field; bundle responses may fill several.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    /// Text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Generated code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Media URLs (images, audio, video, 3D assets).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,
    /// Embedding vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Payload {
    /// Text-only payload.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), ..Self::default() }
    }

    /// Code-only payload.
    #[must_use]
    pub fn code(code: impl Into<String>) -> Self {
        Self { code: Some(code.into()), ..Self::default() }
    }

    /// Media payload.
    #[must_use]
    pub fn media(urls: Vec<String>) -> Self {
        Self { media_urls: urls, ..Self::default() }
    }

    /// Characters of generated text and code, used for token estimation.
    #[must_use]
    pub fn output_chars(&self) -> usize {
        self.text.as_ref().map_or(0, |t| t.chars().count())
            + self.code.as_ref().map_or(0, |c| c.chars().count())
    }

    /// Merges another payload into this one.
    ///
    /// Text and code are joined with a blank line, media URLs appended in
    /// order, and the later embedding replaces the earlier one.
    pub fn merge(&mut self, other: Payload) {
        fn join(slot: &mut Option<String>, value: Option<String>) {
            if let Some(value) = value {
                match slot {
                    Some(existing) => {
                        existing.push_str("\n\n");
                        existing.push_str(&value);
                    }
                    None => *slot = Some(value),
                }
            }
        }

        join(&mut self.text, other.text);
        join(&mut self.code, other.code);
        self.media_urls.extend(other.media_urls);
        if other.embedding.is_some() {
            self.embedding = other.embedding;
        }
    }
}

/// A complete, cost-annotated response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// The content.
    pub payload: Payload,
    /// Tag of the provider that produced it.
    pub provider_tag: String,
    /// Model identifier reported by the provider.
    pub model_id: String,
    /// Wall-clock latency of the successful provider call.
    pub latency: Duration,
    /// Tokens used (reported or estimated).
    pub tokens_used: u64,
    /// Cost in USD.
    pub cost: f64,
}

/// Incremental chunks from a streaming provider call.
pub type TokenStream = BoxStream<'static, Result<String, ProviderError>>;

/// An open, incrementally consumed result channel.
pub struct StreamingChannel {
    /// Tag of the provider serving the stream.
    pub provider_tag: String,
    /// Model identifier serving the stream.
    pub model_id: String,
    /// The chunk stream.
    pub stream: TokenStream,
}

impl StreamingChannel {
    /// Creates a channel.
    #[must_use]
    pub fn new(provider_tag: impl Into<String>, model_id: impl Into<String>, stream: TokenStream) -> Self {
        Self { provider_tag: provider_tag.into(), model_id: model_id.into(), stream }
    }

    /// Drains the stream into one string, stopping at the first error.
    pub async fn collect_text(self) -> Result<String, ProviderError> {
        use futures::StreamExt;

        let mut stream = self.stream;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }
}

impl fmt::Debug for StreamingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingChannel")
            .field("provider_tag", &self.provider_tag)
            .field("model_id", &self.model_id)
            .finish_non_exhaustive()
    }
}

/// What a routed request resolves to.
#[derive(Debug)]
pub enum RouteOutcome {
    /// A complete response.
    Complete(Response),
    /// A streaming channel; no fallback happens once it is returned.
    Streaming(StreamingChannel),
}

impl RouteOutcome {
    /// Returns the complete response, if any.
    #[must_use]
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Complete(response) => Some(response),
            Self::Streaming(_) => None,
        }
    }
}
