//! Deterministic in-process provider
//!
//! Used as the default routing target and in tests. Performs no I/O and
//! never fails.

use crate::domain::{
    ChatRequest, ChatResponse, Choice, RequestContext, ResponseMessage, StreamChunk, Usage,
};
use crate::providers::constants::{defaults, stub};
use crate::providers::{ChunkStream, Provider, ProviderError, ProviderName};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream;

#[derive(Debug, Clone, Default)]
pub struct StubProvider;

impl StubProvider {
    pub fn new() -> Self {
        Self
    }

    fn canned_response(request: &ChatRequest) -> ChatResponse {
        ChatResponse {
            id: stub::RESPONSE_ID.to_string(),
            object: defaults::COMPLETION_OBJECT.to_string(),
            created: Utc::now().timestamp(),
            model: Some(request.model().to_string()),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage::assistant(stub::RESPONSE_TEXT),
                finish_reason: Some(defaults::FINISH_REASON_STOP.to_string()),
            }],
            usage: Usage::default(),
        }
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn label(&self) -> &str {
        ProviderName::STUB
    }

    async fn generate(
        &self,
        request: &ChatRequest,
        _context: &RequestContext,
    ) -> Result<ChatResponse, ProviderError> {
        Ok(Self::canned_response(request))
    }

    async fn stream(
        &self,
        _request: &ChatRequest,
        _context: &RequestContext,
    ) -> Result<ChunkStream, ProviderError> {
        let chunks = stub::STREAM_CHUNKS
            .iter()
            .map(|text| Ok(StreamChunk::new(*text)));
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatCompletionPayload, RawMessage};
    use crate::proxy::validation::validate;
    use futures_util::StreamExt;

    fn request(model: &str) -> ChatRequest {
        validate(ChatCompletionPayload::new(
            model,
            vec![RawMessage::new("user", "hello")],
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn generate_returns_canned_response_for_requested_model() {
        let response = StubProvider::new()
            .generate(&request("test-model"), &RequestContext::anonymous())
            .await
            .unwrap();

        assert_eq!(response.id, "stub");
        assert_eq!(response.model.as_deref(), Some("test-model"));
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].message.content, "stub response");
        assert_eq!(response.choices[0].message.role, "assistant");
        assert_eq!(response.usage, Usage::default());
    }

    #[tokio::test]
    async fn stream_yields_two_chunks_in_order() {
        let chunks: Vec<String> = StubProvider::new()
            .stream(&request("test-model"), &RequestContext::anonymous())
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap().to_string())
            .collect()
            .await;

        assert_eq!(chunks, vec!["stub ".to_string(), "response".to_string()]);
    }
}
