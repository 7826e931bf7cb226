//! Tests for the OpenAI-compatible adapter against a mock upstream

use super::*;
use crate::domain::{
    ChatCompletionPayload, ChatRequest, ClientIdentity, InboundCredential, RawMessage,
    RequestContext, RequestId, StopSequences,
};
use crate::providers::{Provider, ProviderError};
use crate::proxy::validation::validate;
use futures_util::StreamExt;
use mockito::{Matcher, Server};
use serde_json::json;
use std::time::Duration;

fn provider_for(server: &Server, api_key: Option<&str>) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::new(OpenAiCompatConfig {
        base_url: BaseUrl::try_new(format!("{}/v1/", server.url())).unwrap(),
        api_key: api_key.and_then(UpstreamApiKey::parse),
        timeout: Duration::from_secs(5),
    })
}

fn chat_request(model: &str) -> ChatRequest {
    let mut payload = ChatCompletionPayload::new(
        model,
        vec![
            RawMessage::new("system", "be brief"),
            RawMessage::new("user", "hello"),
        ],
    );
    payload.params.temperature = Some(0.5);
    payload.params.stop = Some(StopSequences::Single("END".to_string()));
    validate(payload).unwrap()
}

fn context_with_auth(auth: Option<&str>) -> RequestContext {
    RequestContext::new(
        RequestId::generate(),
        ClientIdentity::anonymous(),
        auth.and_then(InboundCredential::parse),
    )
}

#[tokio::test]
async fn test_generate_posts_payload_and_maps_response() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("content-type", "application/json")
        .match_header("authorization", "Bearer caller-token")
        .match_body(Matcher::PartialJson(json!({
            "model": "llama3",
            "stream": false,
            "temperature": 0.5,
            "stop": "END",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hello"}
            ]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": "chatcmpl-42",
                "object": "chat.completion",
                "created": 1700000000,
                "model": "llama3",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hi there"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let provider = provider_for(&server, Some("env-key"));
    let response = provider
        .generate(
            &chat_request("llama3"),
            &context_with_auth(Some("Bearer caller-token")),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.id, "chatcmpl-42");
    assert_eq!(response.created, 1_700_000_000);
    assert_eq!(response.choices[0].message.content, "Hi there");
    assert_eq!(response.usage.total_tokens, 7);
}

#[tokio::test]
async fn test_configured_key_is_sent_when_caller_has_none() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer env-key")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let provider = provider_for(&server, Some("env-key"));
    let response = provider
        .generate(&chat_request("llama3"), &context_with_auth(None))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.id, "openai_compat");
    assert_eq!(response.choices.len(), 1);
}

#[tokio::test]
async fn test_no_authorization_header_without_any_credential() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    provider_for(&server, None)
        .generate(&chat_request("llama3"), &context_with_auth(None))
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_upstream_statuses_are_mapped() {
    let mut server = Server::new_async().await;
    let _unauthorized = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({"model": "locked"})))
        .with_status(401)
        .with_body(r#"{"error": "invalid api key"}"#)
        .create_async()
        .await;
    let _limited = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({"model": "busy"})))
        .with_status(429)
        .with_header("retry-after", "12")
        .with_body(r#"{"message": "slow down"}"#)
        .create_async()
        .await;
    let _missing = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({"model": "ghost"})))
        .with_status(404)
        .with_body(r#"{"error": {"message": "model \"ghost\" not found, try pulling it first"}}"#)
        .create_async()
        .await;
    let _broken = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({"model": "broken"})))
        .with_status(500)
        .with_body("oops")
        .create_async()
        .await;

    let provider = provider_for(&server, None);
    let ctx = context_with_auth(None);

    assert_eq!(
        provider.generate(&chat_request("locked"), &ctx).await.err(),
        Some(ProviderError::Unauthorized("invalid api key".to_string()))
    );
    assert_eq!(
        provider.generate(&chat_request("busy"), &ctx).await.err(),
        Some(ProviderError::RateLimited {
            message: "slow down".to_string(),
            retry_after_seconds: Some(12),
        })
    );
    assert!(matches!(
        provider.generate(&chat_request("ghost"), &ctx).await,
        Err(ProviderError::ModelNotFound(_))
    ));
    assert_eq!(
        provider.generate(&chat_request("broken"), &ctx).await.err(),
        Some(ProviderError::UpstreamStatus {
            status: 500,
            message: "Internal Server Error".to_string(),
        })
    );
}

#[tokio::test]
async fn test_undecodable_success_body_is_malformed() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body("<html>not json</html>")
        .create_async()
        .await;

    let result = provider_for(&server, None)
        .generate(&chat_request("llama3"), &context_with_auth(None))
        .await;

    assert!(matches!(result, Err(ProviderError::MalformedResponse(_))));
}

#[tokio::test]
async fn test_unreachable_upstream_is_a_transport_error() {
    // Bind then drop a listener so the port is very likely closed
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let provider = OpenAiCompatibleProvider::new(OpenAiCompatConfig {
        base_url: BaseUrl::try_new(format!("http://{addr}")).unwrap(),
        api_key: None,
        timeout: Duration::from_secs(5),
    });

    let result = provider
        .generate(&chat_request("llama3"), &context_with_auth(None))
        .await;

    assert!(matches!(result, Err(ProviderError::Transport(_))));
}

#[tokio::test]
async fn test_stream_relays_deltas_until_done() {
    let mut server = Server::new_async().await;
    let body = [
        r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
        r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#,
        "data: {broken",
        r#"data: {"choices":[{"delta":{"content":", world"}}]}"#,
        "data: [DONE]",
    ]
    .map(|line| format!("{line}\n\n"))
    .concat();

    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("accept", "text/event-stream")
        .match_body(Matcher::PartialJson(json!({"stream": true})))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let chunks: Vec<String> = provider_for(&server, None)
        .stream(&chat_request("llama3"), &context_with_auth(None))
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap().to_string())
        .collect()
        .await;

    mock.assert_async().await;
    assert_eq!(chunks, vec!["Hello".to_string(), ", world".to_string()]);
}

#[tokio::test]
async fn test_stream_status_errors_surface_before_first_chunk() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(403)
        .with_body(r#"{"error": "blocked"}"#)
        .create_async()
        .await;

    let result = provider_for(&server, None)
        .stream(&chat_request("llama3"), &context_with_auth(None))
        .await;

    assert!(matches!(result, Err(ProviderError::Forbidden(message)) if message == "blocked"));
}
