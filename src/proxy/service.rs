//! Main proxy service implementation
//!
//! The `ProxyService` owns the dispatch pipeline and exposes it over HTTP.
//!
//! ## Service Lifecycle
//!
//! ```rust,ignore
//! use switchboard::proxy::{ProxyConfig, ProxyMiddlewareConfig, ProxyService};
//!
//! let service = ProxyService::new(ProxyConfig::default(), ProxyMiddlewareConfig::default());
//! let router = service.into_router();
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, router).await?;
//! ```
//!
//! ## Routes
//!
//! - `POST /proxy`, `POST /proxy/`: unary completion
//! - `POST /proxy/stream`: server-sent event relay
//! - `GET /healthz`: liveness and effective settings
//! - `GET /metrics`: JSON snapshot of request and provider-call aggregates

use crate::domain::{ChatCompletionPayload, ClientIdentity, InboundCredential, RequestContext, RequestId};
use crate::providers::ProviderRegistry;
use crate::proxy::error_response::standard_error_response;
use crate::proxy::headers::{paths, X_REQUEST_ID};
use crate::proxy::metrics::{InMemoryMetrics, MetricsRecorder};
use crate::proxy::middleware_stack::{ProxyMiddlewareConfig, ProxyMiddlewareStack};
use crate::proxy::model_router::ModelRouter;
use crate::proxy::orchestrator::{DispatchMode, ProxyOrchestrator, ProxyReply};
use crate::proxy::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::proxy::streaming::sse_events;
use crate::proxy::types::*;
use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response, Sse},
    routing::{get, post},
    Json, Router,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Main proxy service combining the dispatch pipeline and its HTTP surface
pub struct ProxyService {
    config: ProxyConfig,
    middleware: ProxyMiddlewareConfig,
    orchestrator: ProxyOrchestrator,
    metrics: Arc<InMemoryMetrics>,
    started_at: Instant,
}

impl ProxyService {
    /// Create a service with the stub and OpenAI-compatible providers registered
    pub fn new(config: ProxyConfig, middleware: ProxyMiddlewareConfig) -> Self {
        let registry = ProviderRegistry::with_defaults(config.openai_compat.clone());
        Self::with_registry(config, middleware, registry)
    }

    /// Create a service over an explicit provider registry
    pub fn with_registry(
        config: ProxyConfig,
        middleware: ProxyMiddlewareConfig,
        registry: ProviderRegistry,
    ) -> Self {
        let router = ModelRouter::new(config.provider_rules.clone(), config.default_provider.clone());

        let routed = std::iter::once(router.default_provider())
            .chain(router.rules().iter().map(|rule| &rule.provider));
        for name in routed {
            if !registry.contains(name) {
                warn!(provider = %name, "Routing refers to a provider that is not registered");
            }
        }

        let metrics = Arc::new(InMemoryMetrics::new());
        let recorder: Arc<dyn MetricsRecorder> = metrics.clone();
        let orchestrator = ProxyOrchestrator::new(
            Arc::new(registry),
            router,
            Arc::new(RateLimiter::new(config.rate_limit)),
            recorder,
        );

        Self {
            config,
            middleware,
            orchestrator,
            metrics,
            started_at: Instant::now(),
        }
    }

    pub fn orchestrator(&self) -> &ProxyOrchestrator {
        &self.orchestrator
    }

    pub fn metrics(&self) -> Arc<InMemoryMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Create an Axum router for the proxy service with middleware
    pub fn into_router(self) -> Router {
        let stack = ProxyMiddlewareStack::new(self.middleware.clone(), self.metrics.clone());

        let router = Router::new()
            .route(paths::PROXY, post(proxy_handler))
            .route(paths::PROXY_SLASH, post(proxy_handler))
            .route(paths::PROXY_STREAM, post(stream_handler))
            .route(paths::HEALTH, get(health_handler))
            .route(paths::METRICS, get(metrics_handler))
            .fallback(not_found_handler)
            .method_not_allowed_fallback(method_not_allowed_handler)
            .with_state(Arc::new(self));

        stack.apply_to_router(router)
    }

    /// Turn an HTTP request into a dispatchable payload and its context
    async fn ingest(
        &self,
        request: Request,
    ) -> Result<(ChatCompletionPayload, RequestContext), ProxyFailure> {
        let (parts, body) = request.into_parts();
        let request_id = parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(|| request_id_from_headers(&parts.headers));
        let fail = |error: ProxyError| ProxyFailure::new(request_id.clone(), error);

        let bytes = self.read_body(body, &parts.headers).await.map_err(fail)?;

        let inbound_auth = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(InboundCredential::parse);
        if self.config.require_authorization && inbound_auth.is_none() {
            return Err(fail(ProxyError::MissingAuthorization));
        }

        let payload: ChatCompletionPayload = serde_json::from_slice(&bytes)
            .map_err(|error| fail(ProxyError::MalformedBody(error.to_string())))?;

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let client_identity =
            ClientIdentity::derive(inbound_auth.as_ref().map(InboundCredential::expose), peer);

        Ok((
            payload,
            RequestContext::new(request_id, client_identity, inbound_auth),
        ))
    }

    async fn read_body(&self, body: Body, headers: &HeaderMap) -> Result<Bytes, ProxyError> {
        let Some(max_size) = self.config.max_request_size else {
            return body
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .map_err(|error| ProxyError::MalformedBody(error.to_string()));
        };

        let limit = *max_size.as_ref();
        let declared = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        if declared.is_some_and(|length| length > limit as u64) {
            return Err(ProxyError::RequestTooLarge { max_size });
        }

        match Limited::new(body, limit).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(error) if error.downcast_ref::<LengthLimitError>().is_some() => {
                Err(ProxyError::RequestTooLarge { max_size })
            }
            Err(error) => Err(ProxyError::MalformedBody(error.to_string())),
        }
    }

    async fn dispatch(
        &self,
        request: Request,
        mode: DispatchMode,
    ) -> Result<ProxyReply, ProxyFailure> {
        let (payload, context) = self.ingest(request).await?;
        self.orchestrator.handle(payload, &context, mode).await
    }

    fn health(&self) -> HealthReport {
        HealthReport {
            status: HEALTH_OK,
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            version: self.config.service_version.clone(),
            rate_limit: self.config.rate_limit,
            logging: LoggingReport {
                enabled: self.middleware.logging.log_requests,
                level: self.middleware.logging.level.to_uppercase(),
            },
            cors: CorsReport {
                allow_origins: self.middleware.cors.allow_origins(),
            },
        }
    }
}

const HEALTH_OK: &str = "ok";

/// Body of `GET /healthz`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub uptime_seconds: f64,
    pub version: String,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingReport,
    pub cors: CorsReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingReport {
    pub enabled: bool,
    pub level: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorsReport {
    pub allow_origins: Vec<String>,
}

fn request_id_from_headers(headers: &HeaderMap) -> RequestId {
    RequestId::from_header_or_generate(
        headers
            .get(X_REQUEST_ID)
            .and_then(|value| value.to_str().ok()),
    )
}

fn request_id_of(request: &Request) -> RequestId {
    request
        .extensions()
        .get::<RequestId>()
        .cloned()
        .unwrap_or_else(|| request_id_from_headers(request.headers()))
}

impl IntoResponse for ProxyReply {
    fn into_response(self) -> Response {
        match self {
            ProxyReply::Completion(reply) => Json(reply.value).into_response(),
            ProxyReply::Stream(reply) => {
                Sse::new(sse_events(reply.value, reply.request_id)).into_response()
            }
        }
    }
}

/// Axum handler for unary completions
async fn proxy_handler(
    State(service): State<Arc<ProxyService>>,
    request: Request,
) -> Result<ProxyReply, ProxyFailure> {
    service.dispatch(request, DispatchMode::Unary).await
}

/// Axum handler for streamed completions
async fn stream_handler(
    State(service): State<Arc<ProxyService>>,
    request: Request,
) -> Result<ProxyReply, ProxyFailure> {
    service.dispatch(request, DispatchMode::Streaming).await
}

async fn health_handler(State(service): State<Arc<ProxyService>>) -> Json<HealthReport> {
    Json(service.health())
}

async fn metrics_handler(State(service): State<Arc<ProxyService>>) -> impl IntoResponse {
    Json(service.metrics.snapshot())
}

async fn not_found_handler(request: Request) -> Response {
    standard_error_response(StatusCode::NOT_FOUND, &request_id_of(&request))
}

async fn method_not_allowed_handler(request: Request) -> Response {
    standard_error_response(StatusCode::METHOD_NOT_ALLOWED, &request_id_of(&request))
}
