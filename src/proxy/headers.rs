//! HTTP header constants and well-known paths for the proxy service

/// Header name for request ID used for tracing and correlation
pub const X_REQUEST_ID: &str = "x-request-id";

/// Header name for the proxy API-key gate
pub const X_API_KEY: &str = "x-api-key";

/// `WWW-Authenticate` challenge sent when the API-key gate rejects a request
pub const API_KEY_CHALLENGE: &str = "X-API-Key";

/// Well-known paths
pub mod paths {
    pub const PROXY: &str = "/proxy";
    pub const PROXY_SLASH: &str = "/proxy/";
    pub const PROXY_STREAM: &str = "/proxy/stream";

    /// Health check endpoint path
    pub const HEALTH: &str = "/healthz";

    /// Metrics endpoint path
    pub const METRICS: &str = "/metrics";
}

/// Common content types (re-exported from centralized constants)
pub mod content_types {
    pub use crate::providers::constants::http::content_types::*;
}
