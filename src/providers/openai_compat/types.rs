//! Configuration and wire types for the OpenAI-compatible adapter

use crate::domain::{
    ChatMessage, ChatRequest, ChatResponse, Choice, GenerationParams, ResponseMessage, Role, Usage,
};
use crate::providers::constants::{defaults, sse};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Upstream base URL, e.g. `http://localhost:11434/v1`
///
/// Trailing slashes are trimmed. Only plain `http://` endpoints are accepted
/// since the outbound client has no TLS connector.
#[nutype(
    sanitize(trim, with = |s: String| s.trim_end_matches('/').to_string()),
    validate(predicate = |s: &str| s.len() > "http://".len() && s.starts_with("http://")),
    derive(Debug, Clone, PartialEq, Eq, Display, AsRef, Serialize, Deserialize)
)]
pub struct BaseUrl(String);

impl Default for BaseUrl {
    fn default() -> Self {
        Self::try_new(defaults::BASE_URL.to_string()).expect("default base URL is valid")
    }
}

/// API key sent as a bearer token when the caller supplied none
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamApiKey(String);

impl UpstreamApiKey {
    /// Blank keys count as unset
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UpstreamApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UpstreamApiKey(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiCompatConfig {
    pub base_url: BaseUrl,
    pub api_key: Option<UpstreamApiKey>,
    /// Bounds a whole unary call, or the wait for headers when streaming
    pub timeout: Duration,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            base_url: BaseUrl::default(),
            api_key: None,
            timeout: Duration::from_secs(defaults::TIMEOUT_SECONDS),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        Self {
            role: message.role().as_str(),
            content: message.content(),
        }
    }
}

/// Outbound `POST /chat/completions` body
#[derive(Debug, Serialize)]
pub(crate) struct CompletionPayload<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(flatten)]
    params: &'a GenerationParams,
}

impl<'a> CompletionPayload<'a> {
    pub(crate) fn new(request: &'a ChatRequest, stream: bool) -> Self {
        Self {
            model: request.model().as_ref(),
            messages: request.messages().iter().map(WireMessage::from).collect(),
            stream,
            params: request.params(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireResponseMessage {
    role: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    index: Option<u32>,
    message: Option<WireResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

/// Inbound unary response; every field is optional upstream
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CompletionBody {
    id: Option<String>,
    object: Option<String>,
    created: Option<i64>,
    model: Option<String>,
    choices: Option<Vec<WireChoice>>,
    usage: Option<WireUsage>,
}

impl CompletionBody {
    pub(crate) fn into_chat_response(self, fallback_id: &str) -> ChatResponse {
        let choices = match self.choices {
            Some(choices) if !choices.is_empty() => choices
                .into_iter()
                .map(|choice| {
                    let message = choice.message.unwrap_or_default();
                    Choice {
                        index: choice.index.unwrap_or(0),
                        message: ResponseMessage {
                            role: message
                                .role
                                .unwrap_or_else(|| Role::Assistant.as_str().to_string()),
                            content: message.content.unwrap_or_default(),
                        },
                        finish_reason: choice.finish_reason,
                    }
                })
                .collect(),
            _ => vec![Choice {
                index: 0,
                message: ResponseMessage::assistant(""),
                finish_reason: Some(defaults::FINISH_REASON_STOP.to_string()),
            }],
        };

        let usage = self
            .usage
            .map(|usage| Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            })
            .unwrap_or_default();

        ChatResponse {
            id: self.id.unwrap_or_else(|| fallback_id.to_string()),
            object: self
                .object
                .unwrap_or_else(|| defaults::COMPLETION_OBJECT.to_string()),
            created: self.created.unwrap_or(0),
            model: self.model,
            choices,
            usage,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    choices: Option<Vec<StreamChoice>>,
}

/// What a single upstream SSE `data` payload means for the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamFrame {
    Done,
    Delta(String),
    Skip,
}

/// Interpret one SSE data payload; malformed JSON is skipped, not fatal
pub(crate) fn parse_stream_data(data: &str) -> StreamFrame {
    let data = data.trim();
    if data == sse::DONE_SENTINEL {
        return StreamFrame::Done;
    }
    if data.is_empty() {
        return StreamFrame::Skip;
    }

    let Ok(envelope) = serde_json::from_str::<StreamEnvelope>(data) else {
        return StreamFrame::Skip;
    };

    envelope
        .choices
        .and_then(|choices| choices.into_iter().next())
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty())
        .map_or(StreamFrame::Skip, StreamFrame::Delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("http://localhost:11434/v1/", "http://localhost:11434/v1")]
    #[case("  http://vllm:8000//  ", "http://vllm:8000")]
    #[case("http://h", "http://h")]
    fn base_url_trims_trailing_slashes(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(BaseUrl::try_new(raw.to_string()).unwrap().as_ref(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("http://")]
    #[case("localhost:11434")]
    #[case("https://api.example.com/v1")]
    fn base_url_rejects_unusable_values(#[case] raw: &str) {
        assert!(BaseUrl::try_new(raw.to_string()).is_err());
    }

    #[test]
    fn api_key_is_redacted_and_blank_is_unset() {
        assert!(UpstreamApiKey::parse("  ").is_none());
        let key = UpstreamApiKey::parse("sk-123").unwrap();
        assert_eq!(key.expose(), "sk-123");
        assert!(!format!("{key:?}").contains("sk-123"));
    }

    #[test]
    fn empty_body_gets_every_default() {
        let body: CompletionBody = serde_json::from_value(json!({})).unwrap();
        let response = body.into_chat_response("openai_compat");

        assert_eq!(response.id, "openai_compat");
        assert_eq!(response.object, "chat.completion");
        assert_eq!(response.created, 0);
        assert_eq!(response.usage, Usage::default());
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].message, ResponseMessage::assistant(""));
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn choice_without_message_defaults_to_empty_assistant() {
        let body: CompletionBody = serde_json::from_value(json!({
            "id": "cmpl-1",
            "choices": [{"index": 2, "finish_reason": "length"}],
            "usage": {"prompt_tokens": 3}
        }))
        .unwrap();
        let response = body.into_chat_response("unused");

        assert_eq!(response.id, "cmpl-1");
        assert_eq!(response.choices[0].index, 2);
        assert_eq!(response.choices[0].message, ResponseMessage::assistant(""));
        assert_eq!(response.usage.prompt_tokens, 3);
        assert_eq!(response.usage.total_tokens, 0);
    }

    #[rstest]
    #[case("[DONE]", StreamFrame::Done)]
    #[case("  [DONE] ", StreamFrame::Done)]
    #[case("", StreamFrame::Skip)]
    #[case("{not json", StreamFrame::Skip)]
    #[case(r#"{"choices":[]}"#, StreamFrame::Skip)]
    #[case(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#, StreamFrame::Skip)]
    #[case(r#"{"choices":[{"delta":{"content":""}}]}"#, StreamFrame::Skip)]
    #[case(
        r#"{"choices":[{"delta":{"content":"Hel"}},{"delta":{"content":"x"}}]}"#,
        StreamFrame::Delta("Hel".to_string())
    )]
    fn stream_data_is_interpreted(#[case] data: &str, #[case] expected: StreamFrame) {
        assert_eq!(parse_stream_data(data), expected);
    }
}
