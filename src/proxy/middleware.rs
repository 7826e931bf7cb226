//! Middleware implementations for the proxy service

use crate::domain::RequestId;
use crate::proxy::error_response::standard_error_response;
use crate::proxy::headers::{API_KEY_CHALLENGE, X_API_KEY, X_REQUEST_ID};
use crate::proxy::metrics::MetricsRecorder;
use crate::proxy::types::ApiKey;
use axum::{
    extract::{MatchedPath, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Path label for requests that matched no route
pub const UNMATCHED_PATH: &str = "unmatched";

/// Configuration for the `X-API-Key` gate
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    pub enabled: bool,
    /// With the gate enabled and no keys configured, any non-empty key passes
    pub api_keys: HashSet<ApiKey>,
}

impl AuthConfig {
    pub fn accepts(&self, provided: Option<&str>) -> bool {
        match provided.and_then(|raw| ApiKey::try_new(raw.to_string()).ok()) {
            Some(key) => self.api_keys.is_empty() || self.api_keys.contains(&key),
            None => false,
        }
    }
}

/// Request logging toggle and the level reported by `/healthz`
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub log_requests: bool,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_requests: false,
            level: "info".to_string(),
        }
    }
}

fn request_id_of(request: &Request) -> RequestId {
    request
        .extensions()
        .get::<RequestId>()
        .cloned()
        .unwrap_or_else(|| {
            RequestId::from_header_or_generate(
                request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|h| h.to_str().ok()),
            )
        })
}

/// Request ID middleware - echoes a caller-supplied id or mints one
///
/// The id is stored in request extensions for handlers and always set on
/// the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::from_header_or_generate(
        request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|h| h.to_str().ok()),
    );
    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;

    match HeaderValue::from_str(request_id.as_ref()) {
        Ok(value) => {
            response.headers_mut().insert(X_REQUEST_ID, value);
        }
        Err(_) => debug!(request_id = %request_id, "Request id is not a valid header value"),
    }
    response
}

/// Metrics middleware - counts and times every request by route template
pub async fn metrics_middleware(
    State(metrics): State<Arc<dyn MetricsRecorder>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_PATH.to_string());

    let response = next.run(request).await;

    metrics.record_request(
        method.as_str(),
        &path,
        response.status().as_u16(),
        start.elapsed(),
    );
    response
}

/// Logging middleware - logs request/response details with timing
///
/// The Authorization value is never logged, only whether it was present.
pub async fn logging_middleware(
    State(config): State<Arc<LoggingConfig>>,
    request: Request,
    next: Next,
) -> Response {
    if !config.log_requests {
        return next.run(request).await;
    }

    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request_id_of(&request);
    let has_auth = request.headers().contains_key(header::AUTHORIZATION);

    debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        has_auth,
        "Incoming request"
    );

    let response = next.run(request).await;

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        auth = if has_auth { "redacted" } else { "none" },
        "Request completed"
    );

    response
}

/// API-key gate - requires a configured `X-API-Key` when enabled
pub async fn api_key_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request,
    next: Next,
) -> Response {
    if !auth_config.enabled {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(X_API_KEY)
        .and_then(|h| h.to_str().ok());

    if auth_config.accepts(provided) {
        return next.run(request).await;
    }

    let request_id = request_id_of(&request);
    warn!(
        request_id = %request_id,
        key_present = provided.is_some(),
        "Rejected request without a valid API key"
    );

    let mut response = standard_error_response(StatusCode::UNAUTHORIZED, &request_id);
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static(API_KEY_CHALLENGE),
    );
    response
}
