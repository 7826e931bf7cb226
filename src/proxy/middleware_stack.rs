//! Middleware stack builder for clean composition
//!
//! Layers are applied in the following order (outer to inner):
//! 1. Request ID generation/propagation
//! 2. Metrics
//! 3. Request logging
//! 4. CORS
//! 5. API-key gate
//! 6. Panic catcher
//!
//! Every response, including rejections from the gate and caught panics,
//! passes back through the request-id, metrics and logging layers.

use crate::proxy::error_response::ErrorResponse;
use crate::proxy::metrics::MetricsRecorder;
use crate::proxy::middleware::*;
use axum::{
    http::{HeaderValue, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::Response,
    Router,
};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tracing::error;

/// Origin wildcard accepted in configuration
pub const ANY_ORIGIN: &str = "*";

/// Allowed CORS origins
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorsConfig {
    AllowAll,
    AllowOrigins(Vec<String>),
}

impl CorsConfig {
    /// `*` anywhere in the list allows every origin
    pub fn from_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let origins: Vec<String> = origins
            .into_iter()
            .map(|origin| origin.as_ref().trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        if origins.iter().any(|origin| origin == ANY_ORIGIN) {
            Self::AllowAll
        } else {
            Self::AllowOrigins(origins)
        }
    }

    /// Origins as reported by `/healthz`
    pub fn allow_origins(&self) -> Vec<String> {
        match self {
            Self::AllowAll => vec![ANY_ORIGIN.to_string()],
            Self::AllowOrigins(origins) => origins.clone(),
        }
    }

    fn layer(&self) -> CorsLayer {
        match self {
            Self::AllowAll => CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin),
            Self::AllowOrigins(origins) => {
                let allowed: Vec<HeaderValue> =
                    origins.iter().filter_map(|o| o.parse().ok()).collect();
                CorsLayer::new()
                    .allow_origin(allowed)
                    .allow_methods(AnyOrigin)
                    .allow_headers(AnyOrigin)
            }
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self::AllowAll
    }
}

/// Configuration for the entire middleware stack
#[derive(Clone, Debug, Default)]
pub struct ProxyMiddlewareConfig {
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
}

impl ProxyMiddlewareConfig {
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_cors(mut self, cors: CorsConfig) -> Self {
        self.cors = cors;
        self
    }
}

/// Builder for composing the proxy middleware stack
pub struct ProxyMiddlewareStack {
    config: ProxyMiddlewareConfig,
    metrics: Arc<dyn MetricsRecorder>,
}

impl ProxyMiddlewareStack {
    pub fn new(config: ProxyMiddlewareConfig, metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self { config, metrics }
    }

    /// Apply the complete middleware stack to a router
    pub fn apply_to_router<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let ProxyMiddlewareConfig { auth, logging, cors } = self.config;

        router
            // Innermost first
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(from_fn_with_state(Arc::new(auth), api_key_middleware))
            .layer(cors.layer())
            .layer(from_fn_with_state(Arc::new(logging), logging_middleware))
            .layer(from_fn_with_state(self.metrics, metrics_middleware))
            .layer(from_fn(request_id_middleware))
    }
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "Handler panicked");

    ErrorResponse::new("INTERNAL_ERROR", "Internal server error")
        .into_response_with_status(StatusCode::INTERNAL_SERVER_ERROR)
}
