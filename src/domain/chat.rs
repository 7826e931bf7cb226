//! Chat-completion request and response types
//!
//! Inbound bodies arrive as [`ChatCompletionPayload`] and only become a
//! [`ChatRequest`] after passing validation, so every `ChatRequest` in the
//! system already satisfies the message invariants.

use nutype::nutype;
use serde::{Deserialize, Serialize};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Model identifier as requested by the client
#[nutype(
    validate(predicate = |s: &str| !s.trim().is_empty()),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        AsRef
    )
)]
pub struct ModelName(String);

/// Message text; never blank
#[nutype(
    validate(predicate = |s: &str| !s.trim().is_empty()),
    derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display, AsRef)
)]
pub struct MessageContent(String);

/// A validated conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    role: Role,
    content: MessageContent,
}

impl ChatMessage {
    pub fn new(role: Role, content: MessageContent) -> Self {
        Self { role, content }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        self.content.as_ref()
    }
}

/// Stop sequences accept either a single string or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    Single(String),
    Multiple(Vec<String>),
}

/// Optional OpenAI-compatible sampling parameters, forwarded when present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequences>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
}

/// Message exactly as received on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub role: String,
    pub content: String,
}

impl RawMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Inbound request body before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionPayload {
    pub model: String,
    pub messages: Vec<RawMessage>,
    #[serde(flatten)]
    pub params: GenerationParams,
}

impl ChatCompletionPayload {
    pub fn new(model: impl Into<String>, messages: Vec<RawMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            params: GenerationParams::default(),
        }
    }
}

/// A request that has passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    model: ModelName,
    messages: Vec<ChatMessage>,
    params: GenerationParams,
}

impl ChatRequest {
    pub(crate) fn new(
        model: ModelName,
        messages: Vec<ChatMessage>,
        params: GenerationParams,
    ) -> Self {
        Self {
            model,
            messages,
            params,
        }
    }

    pub fn model(&self) -> &ModelName {
        &self.model
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }
}

/// Message returned by a provider; upstream content may legitimately be empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: String,
}

impl ResponseMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant.as_str().to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Unary completion returned to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

/// One incremental piece of a streamed completion, relayed verbatim
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::From)]
pub struct StreamChunk(String);

impl StreamChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_accepts_optional_sampling_parameters() {
        let payload: ChatCompletionPayload = serde_json::from_value(json!({
            "model": "llama3",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.2,
            "stop": ["\n"],
            "n": 2
        }))
        .unwrap();

        assert_eq!(payload.params.temperature, Some(0.2));
        assert_eq!(
            payload.params.stop,
            Some(StopSequences::Multiple(vec!["\n".to_string()]))
        );
        assert_eq!(payload.params.n, Some(2));
        assert_eq!(payload.params.max_tokens, None);
    }

    #[test]
    fn payload_without_messages_is_rejected() {
        let result = serde_json::from_value::<ChatCompletionPayload>(json!({"model": "m"}));
        assert!(result.is_err());
    }

    #[test]
    fn absent_parameters_are_not_serialized() {
        let value = serde_json::to_value(GenerationParams::default()).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn blank_content_cannot_be_constructed() {
        assert!(MessageContent::try_new("  \n".to_string()).is_err());
        assert!(MessageContent::try_new(" hi ".to_string()).is_ok());
    }

    #[test]
    fn roles_parse_from_their_wire_names() {
        for role in [Role::System, Role::User, Role::Assistant] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("tool"), None);
        assert_eq!(Role::parse("User"), None);
    }
}
