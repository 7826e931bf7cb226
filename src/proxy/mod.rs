//! Proxy module for routing chat-completion requests to providers
//!
//! The dispatch core (validation, rate limiting, model routing and provider
//! invocation) lives in [`orchestrator`]; [`service`] exposes it over HTTP
//! behind the middleware stack.

pub mod error_response;
pub mod headers;
pub mod metrics;
pub mod middleware;
pub mod middleware_stack;
pub mod model_router;
pub mod orchestrator;
pub mod rate_limiter;
pub mod service;
pub mod streaming;
pub mod types;
pub mod validation;


pub use metrics::{InMemoryMetrics, MetricsRecorder};
pub use middleware::{AuthConfig, LoggingConfig};
pub use middleware_stack::{CorsConfig, ProxyMiddlewareConfig};
pub use model_router::{ModelRouter, ProviderRules};
pub use orchestrator::{DispatchMode, ProxyOrchestrator, ProxyReply};
pub use rate_limiter::{RateDecision, RateLimitConfig, RateLimiter};
pub use service::ProxyService;
pub use types::{ProxyConfig, ProxyError, ProxyFailure};
pub use validation::{validate, ValidationError};
