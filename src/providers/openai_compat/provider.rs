//! OpenAI-compatible provider implementation

use crate::domain::{ChatRequest, ChatResponse, InboundCredential, RequestContext, StreamChunk};
use crate::providers::constants::http::{content_types, BEARER_PREFIX};
use crate::providers::constants::{paths, OPENAI_COMPAT_LABEL};
use crate::providers::openai_compat::errors::map_upstream_status;
use crate::providers::openai_compat::types::{
    parse_stream_data, CompletionBody, CompletionPayload, OpenAiCompatConfig, StreamFrame,
    UpstreamApiKey,
};
use crate::providers::{ChunkStream, Provider, ProviderError};
use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request, Response, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::fmt::Display;
use tracing::{debug, warn};

/// Authorization header value for the upstream call
///
/// A non-blank inbound credential is forwarded verbatim; otherwise the
/// configured key is sent as a bearer token; otherwise no header.
pub fn resolve_authorization(
    inbound: Option<&InboundCredential>,
    api_key: Option<&UpstreamApiKey>,
) -> Option<String> {
    inbound
        .filter(|credential| !credential.expose().trim().is_empty())
        .map(|credential| credential.expose().to_string())
        .or_else(|| api_key.map(|key| format!("{BEARER_PREFIX}{}", key.expose())))
}

/// Provider speaking the Chat Completions API over plain HTTP
pub struct OpenAiCompatibleProvider {
    config: OpenAiCompatConfig,
    client: Client<HttpConnector, Body>,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { config, client }
    }

    pub fn config(&self) -> &OpenAiCompatConfig {
        &self.config
    }

    fn endpoint(&self) -> Result<Uri, ProviderError> {
        let target = format!("{}{}", self.config.base_url, paths::CHAT_COMPLETIONS);
        target
            .parse()
            .map_err(|_| ProviderError::InvalidRequest(format!("invalid upstream URL {target}")))
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
        stream: bool,
    ) -> Result<Request<Body>, ProviderError> {
        let payload = serde_json::to_vec(&CompletionPayload::new(request, stream))
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;

        let accept = if stream {
            content_types::TEXT_EVENT_STREAM
        } else {
            content_types::APPLICATION_JSON
        };

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint()?)
            .header(CONTENT_TYPE, content_types::APPLICATION_JSON)
            .header(ACCEPT, accept);

        if let Some(authorization) =
            resolve_authorization(context.inbound_auth.as_ref(), self.config.api_key.as_ref())
        {
            builder = builder.header(AUTHORIZATION, authorization);
        }

        builder
            .body(Body::from(payload))
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))
    }

    async fn send(&self, request: Request<Body>) -> Result<Response<Incoming>, ProviderError> {
        self.client
            .request(request)
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))
    }

    async fn collect_body(body: Incoming) -> Result<Bytes, ProviderError> {
        Ok(body
            .collect()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?
            .to_bytes())
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn label(&self) -> &str {
        OPENAI_COMPAT_LABEL
    }

    async fn generate(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<ChatResponse, ProviderError> {
        let http_request = self.build_request(request, context, false)?;
        let timeout = self.config.timeout;

        let exchange = async {
            let response = self.send(http_request).await?;
            let (parts, body) = response.into_parts();
            let bytes = Self::collect_body(body).await?;
            Ok::<_, ProviderError>((parts, bytes))
        };
        let (parts, body) = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ProviderError::Timeout(timeout))??;

        if !parts.status.is_success() {
            let err = map_upstream_status(
                parts.status,
                &parts.headers,
                &body,
                request.model().as_ref(),
            );
            debug!(status = parts.status.as_u16(), error = %err, "Upstream returned an error status");
            return Err(err);
        }

        let completion: CompletionBody = serde_json::from_slice(&body)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        Ok(completion.into_chat_response(self.label()))
    }

    async fn stream(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<ChunkStream, ProviderError> {
        let http_request = self.build_request(request, context, true)?;
        let timeout = self.config.timeout;

        let response = tokio::time::timeout(timeout, self.send(http_request))
            .await
            .map_err(|_| ProviderError::Timeout(timeout))??;

        if !response.status().is_success() {
            let (parts, body) = response.into_parts();
            let body = tokio::time::timeout(timeout, Self::collect_body(body))
                .await
                .map_err(|_| ProviderError::Timeout(timeout))??;
            return Err(map_upstream_status(
                parts.status,
                &parts.headers,
                &body,
                request.model().as_ref(),
            ));
        }

        Ok(Box::pin(relay_deltas(response.into_body().into_data_stream())))
    }
}

/// Turn an upstream SSE byte stream into content chunks
///
/// Ends at `[DONE]` or when upstream closes. Unparseable events are skipped;
/// a transport failure yields one `StreamInterrupted` and ends the stream.
pub(crate) fn relay_deltas<S, B, E>(
    bytes: S,
) -> impl Stream<Item = Result<StreamChunk, ProviderError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    async_stream::stream! {
        let mut events = Box::pin(bytes.eventsource());
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => match parse_stream_data(&event.data) {
                    StreamFrame::Done => break,
                    StreamFrame::Delta(text) => yield Ok(StreamChunk::new(text)),
                    StreamFrame::Skip => {}
                },
                Err(EventStreamError::Transport(e)) => {
                    warn!(error = %e, "Upstream stream interrupted");
                    yield Err(ProviderError::StreamInterrupted(e.to_string()));
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "Skipping undecodable upstream event");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClientIdentity, RequestId};

    fn context(auth: Option<&str>) -> RequestContext {
        RequestContext::new(
            RequestId::generate(),
            ClientIdentity::anonymous(),
            auth.and_then(InboundCredential::parse),
        )
    }

    #[test]
    fn inbound_credential_takes_precedence() {
        let key = UpstreamApiKey::parse("sk-env");
        let ctx = context(Some("Bearer caller"));
        assert_eq!(
            resolve_authorization(ctx.inbound_auth.as_ref(), key.as_ref()),
            Some("Bearer caller".to_string())
        );
    }

    #[test]
    fn configured_key_is_used_when_caller_sent_none() {
        let key = UpstreamApiKey::parse("sk-env");
        assert_eq!(
            resolve_authorization(None, key.as_ref()),
            Some("Bearer sk-env".to_string())
        );
        assert_eq!(resolve_authorization(None, None), None);
    }

    #[test]
    fn endpoint_appends_chat_completions() {
        let provider = OpenAiCompatibleProvider::new(OpenAiCompatConfig::default());
        assert_eq!(
            provider.endpoint().unwrap().to_string(),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn relay_stops_at_done_and_skips_noise() {
        let body = concat!(
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: not-json\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"after\"}}]}\n\n",
        );
        // Split mid-event to exercise incremental parsing
        let (head, tail) = body.split_at(70);
        let source = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from(head)),
            Ok(Bytes::from(tail)),
        ]);

        let chunks: Vec<String> = relay_deltas(source)
            .map(|chunk| chunk.unwrap().to_string())
            .collect()
            .await;

        assert_eq!(chunks, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[tokio::test]
    async fn transport_failure_interrupts_the_stream() {
        let source = futures_util::stream::iter(vec![
            Ok(Bytes::from("data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from("data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n")),
        ]);

        let items: Vec<_> = relay_deltas(source).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok(StreamChunk::new("a")));
        assert!(matches!(items[1], Err(ProviderError::StreamInterrupted(_))));
    }
}
