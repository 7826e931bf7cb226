//! Type definitions for the proxy module

use crate::domain::RequestId;
use crate::providers::openai_compat::OpenAiCompatConfig;
use crate::providers::{ProviderError, ProviderName, UnknownProviderError};
use crate::proxy::model_router::ProviderRules;
use crate::proxy::rate_limiter::RateLimitConfig;
use crate::proxy::validation::ValidationError;
use nutype::nutype;
use thiserror::Error;

/// Maximum size for inbound request bodies in bytes
#[nutype(
    derive(Clone, Copy, Debug, Display, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |size: &usize| *size > 0),
)]
pub struct RequestSizeLimit(usize);

/// API key accepted by the `X-API-Key` gate
#[nutype(
    sanitize(trim),
    derive(Clone, Debug, Hash, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef),
    validate(not_empty),
)]
pub struct ApiKey(String);

/// Proxy configuration
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub default_provider: ProviderName,
    pub provider_rules: ProviderRules,
    pub openai_compat: OpenAiCompatConfig,
    pub rate_limit: RateLimitConfig,
    /// `None` disables the body size check
    pub max_request_size: Option<RequestSizeLimit>,
    /// Reject requests without an `Authorization` header
    pub require_authorization: bool,
    pub service_version: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderName::stub(),
            provider_rules: ProviderRules::default(),
            openai_compat: OpenAiCompatConfig::default(),
            rate_limit: RateLimitConfig::default(),
            max_request_size: None,
            require_authorization: true,
            service_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Errors that can occur in the proxy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Authorization header is required")]
    MissingAuthorization,

    #[error("Request body exceeds {max_size} bytes")]
    RequestTooLarge { max_size: RequestSizeLimit },

    #[error("Rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Model not found: {0}")]
    UnknownModel(String),

    #[error(transparent)]
    UnknownProvider(#[from] UnknownProviderError),

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ProviderError> for ProxyError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::ModelNotFound(message) => Self::UnknownModel(message),
            other => Self::Provider(other),
        }
    }
}

impl ProxyError {
    /// Seconds for the `Retry-After` header, when one applies
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            Self::Provider(ProviderError::RateLimited {
                retry_after_seconds,
                ..
            }) => *retry_after_seconds,
            _ => None,
        }
    }
}

/// A failed dispatch, still correlated to its request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyFailure {
    pub request_id: RequestId,
    pub error: ProxyError,
}

impl ProxyFailure {
    pub fn new(request_id: RequestId, error: impl Into<ProxyError>) -> Self {
        Self {
            request_id,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_not_found_becomes_unknown_model() {
        let error: ProxyError = ProviderError::ModelNotFound("model x not found".into()).into();
        assert_eq!(error, ProxyError::UnknownModel("model x not found".into()));
    }

    #[test]
    fn retry_after_comes_from_limiter_or_upstream() {
        assert_eq!(
            ProxyError::RateLimited {
                retry_after_seconds: 4
            }
            .retry_after(),
            Some(4)
        );
        let upstream: ProxyError = ProviderError::RateLimited {
            message: "slow".into(),
            retry_after_seconds: Some(9),
        }
        .into();
        assert_eq!(upstream.retry_after(), Some(9));
        assert_eq!(ProxyError::MissingAuthorization.retry_after(), None);
    }

    #[test]
    fn api_keys_are_trimmed_and_non_empty() {
        assert_eq!(
            ApiKey::try_new(" k1 ".to_string()).unwrap().as_ref(),
            "k1"
        );
        assert!(ApiKey::try_new("  ".to_string()).is_err());
    }
}
