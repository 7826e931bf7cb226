//! Relay of provider chunks to clients as server-sent events
//!
//! Each chunk becomes one `data:` event and a clean finish adds
//! `data: [DONE]`. A provider failure mid-stream becomes a single
//! `event: error` carrying the usual error body, and no `[DONE]` follows.
//!
//! The relay owns the provider stream, so dropping the response body (client
//! disconnect) drops the provider stream and its upstream connection.

use crate::domain::RequestId;
use crate::providers::constants::sse::DONE_SENTINEL;
use crate::providers::ChunkStream;
use crate::proxy::types::ProxyFailure;
use axum::response::sse::Event;
use futures_util::{Stream, StreamExt};
use std::convert::Infallible;
use tracing::{debug, warn};

/// Name of the terminal event emitted when the provider fails mid-stream
pub const ERROR_EVENT: &str = "error";

/// SSE fields cannot carry carriage returns; normalize them to newlines
fn sse_safe(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

pub fn sse_events(
    chunks: ChunkStream,
    request_id: RequestId,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    async_stream::stream! {
        let mut chunks = chunks;
        let mut relayed = 0usize;
        let mut failed = false;

        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => {
                    relayed += 1;
                    yield Ok(Event::default().data(sse_safe(chunk.as_str())));
                }
                Err(error) => {
                    warn!(request_id = %request_id, relayed, error = %error, "Provider stream failed");
                    let failure = ProxyFailure::new(request_id.clone(), error);
                    let body = serde_json::to_string(&failure.to_error_response())
                        .unwrap_or_else(|_| r#"{"code":"INTERNAL_ERROR"}"#.to_string());
                    yield Ok(Event::default().event(ERROR_EVENT).data(body));
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            debug!(request_id = %request_id, relayed, "Stream completed");
            yield Ok(Event::default().data(DONE_SENTINEL));
        }
    }
}
