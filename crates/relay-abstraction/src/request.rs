//! Request data model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

/// The kind of AI task a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Free-form text / chat.
    Text,
    /// Code completion or generation.
    Code,
    /// Image generation.
    Image,
    /// Audio generation (speech, music, effects).
    Audio,
    /// Video generation.
    Video,
    /// Long-form reasoning, served by chat endpoints.
    Reasoning,
    /// Image analysis.
    Vision,
    /// 3D asset generation.
    #[serde(rename = "3d")]
    ThreeD,
    /// Vector embedding.
    Embedding,
}

impl RequestKind {
    /// Whether the kind produces media rather than tokens.
    #[must_use]
    pub fn is_media(&self) -> bool {
        matches!(self, Self::Image | Self::Audio | Self::Video | Self::ThreeD)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Code => "code",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Reasoning => "reasoning",
            Self::Vision => "vision",
            Self::ThreeD => "3d",
            Self::Embedding => "embedding",
        };
        write!(f, "{}", name)
    }
}

/// Coarse quality hint influencing provider selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Default tier: registration order decides.
    #[default]
    Standard,
    /// Premium tier: premium-capable providers are tried first.
    Premium,
}

impl FromStr for Tier {
    type Err = ();

    /// Parses a tier name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "premium" => Ok(Self::Premium),
            _ => Err(()),
        }
    }
}

/// A message in a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender (e.g. "user", "assistant").
    pub role: String,
    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Creates a new message.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }
}

/// Per-request options shared with bundle sub-requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Ask the provider for an incremental streaming channel.
    #[serde(default)]
    pub stream: bool,
    /// Caller-side abort signal. Cancelling it cancels the routed job.
    #[serde(skip)]
    pub abort: Option<CancellationToken>,
    /// Provider-specific knobs (temperature, size, voice, ...).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An abstract "do this AI task" request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// What kind of task this is.
    pub kind: RequestKind,
    /// The prompt. May be rewritten by sanitization before dispatch.
    #[serde(default)]
    pub prompt: String,
    /// Prior conversation turns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ChatMessage>,
    /// Optional system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Quality tier.
    #[serde(default)]
    pub tier: Tier,
    /// Options (streaming, abort signal, provider knobs).
    #[serde(default)]
    pub options: RequestOptions,
    /// Sub-requests whose results are merged into one response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bundle: Vec<Request>,
}

impl Request {
    /// Creates a request of the given kind with default options.
    #[must_use]
    pub fn new(kind: RequestKind, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
            history: Vec::new(),
            system_prompt: None,
            tier: Tier::Standard,
            options: RequestOptions::default(),
            bundle: Vec::new(),
        }
    }

    /// Shorthand for a text request.
    #[must_use]
    pub fn text(prompt: impl Into<String>) -> Self {
        Self::new(RequestKind::Text, prompt)
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Sets the tier.
    #[must_use]
    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    /// Sets the conversation history.
    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    /// Requests a streaming channel.
    #[must_use]
    pub fn streaming(mut self) -> Self {
        self.options.stream = true;
        self
    }

    /// Attaches a caller abort signal.
    #[must_use]
    pub fn with_abort(mut self, token: CancellationToken) -> Self {
        self.options.abort = Some(token);
        self
    }

    /// Adds a sub-request to the bundle.
    #[must_use]
    pub fn with_sub_request(mut self, request: Request) -> Self {
        self.bundle.push(request);
        self
    }

    /// Whether this request is a bundle of sub-requests.
    #[must_use]
    pub fn is_bundle(&self) -> bool {
        !self.bundle.is_empty()
    }

    /// Total characters sent to the provider (prompt, system prompt, history).
    #[must_use]
    pub fn input_chars(&self) -> usize {
        self.prompt.chars().count()
            + self.system_prompt.as_ref().map_or(0, |s| s.chars().count())
            + self.history.iter().map(|m| m.content.chars().count()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serde_names() {
        let kind: RequestKind = serde_json::from_str("\"3d\"").unwrap();
        assert_eq!(kind, RequestKind::ThreeD);
        assert_eq!(serde_json::to_string(&RequestKind::Vision).unwrap(), "\"vision\"");
        assert_eq!(RequestKind::ThreeD.to_string(), "3d");
    }

    #[test]
    fn test_request_from_json_defaults() {
        let request: Request =
            serde_json::from_str(r#"{"kind":"text","prompt":"hello","tier":"premium"}"#).unwrap();
        assert_eq!(request.tier, Tier::Premium);
        assert_eq!("PREMIUM".parse::<Tier>(), Ok(Tier::Premium));
        assert!("gold".parse::<Tier>().is_err());
        assert!(!request.options.stream);
        assert!(request.options.abort.is_none());
        assert!(!request.is_bundle());
    }

    #[test]
    fn test_input_chars_counts_history_and_system() {
        let request = Request::text("abcd")
            .with_system_prompt("xy")
            .with_history(vec![ChatMessage::new("user", "123")]);
        assert_eq!(request.input_chars(), 9);
    }
}
