//! Unified error response handling for the proxy service
//!
//! Every error body has the same shape, `{code, message, request_id,
//! details?}`, and every error response carries `x-request-id`.

use crate::domain::RequestId;
use crate::providers::ProviderError;
use crate::proxy::headers::X_REQUEST_ID;
use crate::proxy::types::{ProxyError, ProxyFailure};
use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

/// Standard error response format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Unique error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Request ID for correlation
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: None,
            details: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Convert to HTTP response with proper headers
    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        let request_id = self.request_id.clone();
        let mut response = (status, Json(self)).into_response();

        if let Some(id) = request_id {
            if let Ok(header_value) = HeaderValue::from_str(&id) {
                response.headers_mut().insert(X_REQUEST_ID, header_value);
            }
        }

        response
    }
}

/// Extension trait for consistent error formatting
pub trait ErrorResponseExt {
    /// Convert to standardized error response
    fn to_error_response(&self) -> ErrorResponse;

    /// Get the appropriate HTTP status code
    fn status_code(&self) -> StatusCode;
}

fn provider_error_response(error: &ProviderError) -> ErrorResponse {
    use ProviderError::*;

    match error {
        Timeout(after) => ErrorResponse::new(
            "UPSTREAM_TIMEOUT",
            format!("Upstream provider timed out after {}s", after.as_secs()),
        ),
        RateLimited { message, .. } => {
            ErrorResponse::new("UPSTREAM_RATE_LIMITED", message.clone())
                .with_details(json!({ "upstream_status": 429 }))
        }
        Unauthorized(message) => ErrorResponse::new("UPSTREAM_UNAUTHORIZED", message.clone())
            .with_details(json!({ "upstream_status": 401 })),
        Forbidden(message) => ErrorResponse::new("UPSTREAM_FORBIDDEN", message.clone())
            .with_details(json!({ "upstream_status": 403 })),
        UpstreamStatus { status, message } => {
            ErrorResponse::new("UPSTREAM_ERROR", message.clone())
                .with_details(json!({ "upstream_status": status }))
        }
        Transport(_) => ErrorResponse::new("UPSTREAM_UNAVAILABLE", "Upstream provider is unreachable"),
        MalformedResponse(_) => ErrorResponse::new(
            "UPSTREAM_MALFORMED_RESPONSE",
            "Upstream provider returned an unreadable response",
        ),
        StreamInterrupted(_) => {
            ErrorResponse::new("UPSTREAM_STREAM_INTERRUPTED", "Upstream stream was interrupted")
        }
        ModelNotFound(message) => ErrorResponse::new("MODEL_NOT_FOUND", message.clone()),
        InvalidRequest(_) => ErrorResponse::new("INTERNAL_ERROR", "Internal server error"),
    }
}

fn provider_status(error: &ProviderError) -> StatusCode {
    match error {
        ProviderError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ProviderError::RateLimited { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ProviderError::ModelNotFound(_) => StatusCode::NOT_FOUND,
        ProviderError::InvalidRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl ErrorResponseExt for ProxyError {
    fn to_error_response(&self) -> ErrorResponse {
        use ProxyError::*;

        match self {
            Validation(error) => ErrorResponse::new(error.code(), error.to_string()),
            MalformedBody(reason) => {
                ErrorResponse::new("MALFORMED_BODY", format!("Malformed request body: {reason}"))
            }
            MissingAuthorization => {
                ErrorResponse::new("MISSING_AUTHORIZATION", "Authorization header is required")
            }
            RequestTooLarge { max_size } => ErrorResponse::new(
                "REQUEST_TOO_LARGE",
                format!("Request body exceeds {max_size} bytes"),
            ),
            RateLimited {
                retry_after_seconds,
            } => ErrorResponse::new("RATE_LIMITED", "Rate limit exceeded")
                .with_details(json!({ "retry_after_seconds": retry_after_seconds })),
            UnknownModel(message) => ErrorResponse::new("MODEL_NOT_FOUND", message.clone()),
            UnknownProvider(_) => ErrorResponse::new(
                "PROVIDER_NOT_CONFIGURED",
                "No provider is configured for this model",
            ),
            Provider(error) => provider_error_response(error),
            Internal(_) => ErrorResponse::new("INTERNAL_ERROR", "Internal server error"),
        }
    }

    fn status_code(&self) -> StatusCode {
        use ProxyError::*;

        match self {
            Validation(_) => StatusCode::BAD_REQUEST,
            MalformedBody(_) | MissingAuthorization => StatusCode::UNPROCESSABLE_ENTITY,
            RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            UnknownModel(_) => StatusCode::NOT_FOUND,
            UnknownProvider(_) | Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Provider(error) => provider_status(error),
        }
    }
}

impl ProxyFailure {
    /// Error body for this failure, request id included
    pub fn to_error_response(&self) -> ErrorResponse {
        self.error
            .to_error_response()
            .with_request_id(self.request_id.as_ref())
    }
}

impl IntoResponse for ProxyFailure {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        if status.is_server_error() {
            error!(
                request_id = %self.request_id,
                status = status.as_u16(),
                error = %self.error,
                "Request failed"
            );
        }

        let retry_after = self.error.retry_after();
        let mut response = self.to_error_response().into_response_with_status(status);
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

/// Error response for failures outside the dispatch pipeline
pub fn standard_error_response(status: StatusCode, request_id: &RequestId) -> Response {
    let (code, message) = match status {
        StatusCode::UNAUTHORIZED => ("UNAUTHORIZED", "Missing or invalid API key"),
        StatusCode::NOT_FOUND => ("NOT_FOUND", "Resource not found"),
        StatusCode::METHOD_NOT_ALLOWED => ("METHOD_NOT_ALLOWED", "Method not allowed"),
        StatusCode::INTERNAL_SERVER_ERROR => ("INTERNAL_ERROR", "Internal server error"),
        _ => ("ERROR", "An error occurred"),
    };

    ErrorResponse::new(code, message)
        .with_request_id(request_id.as_ref())
        .into_response_with_status(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ProviderName, UnknownProviderError};
    use crate::proxy::types::RequestSizeLimit;
    use crate::proxy::validation::ValidationError;
    use rstest::rstest;
    use std::time::Duration;

    fn upstream(status: u16) -> ProxyError {
        ProxyError::Provider(ProviderError::UpstreamStatus {
            status,
            message: "boom".to_string(),
        })
    }

    #[rstest]
    #[case(ProxyError::Validation(ValidationError::EmptyMessages), StatusCode::BAD_REQUEST)]
    #[case(ProxyError::MalformedBody("eof".into()), StatusCode::UNPROCESSABLE_ENTITY)]
    #[case(ProxyError::MissingAuthorization, StatusCode::UNPROCESSABLE_ENTITY)]
    #[case(
        ProxyError::RequestTooLarge { max_size: RequestSizeLimit::try_new(10).unwrap() },
        StatusCode::PAYLOAD_TOO_LARGE
    )]
    #[case(ProxyError::RateLimited { retry_after_seconds: 3 }, StatusCode::TOO_MANY_REQUESTS)]
    #[case(ProxyError::UnknownModel("m".into()), StatusCode::NOT_FOUND)]
    #[case(
        ProxyError::UnknownProvider(UnknownProviderError(ProviderName::stub())),
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    #[case(
        ProxyError::Provider(ProviderError::Timeout(Duration::from_secs(600))),
        StatusCode::GATEWAY_TIMEOUT
    )]
    #[case(
        ProxyError::Provider(ProviderError::RateLimited { message: "x".into(), retry_after_seconds: None }),
        StatusCode::SERVICE_UNAVAILABLE
    )]
    #[case(ProxyError::Provider(ProviderError::Unauthorized("x".into())), StatusCode::BAD_GATEWAY)]
    #[case(ProxyError::Provider(ProviderError::Transport("x".into())), StatusCode::BAD_GATEWAY)]
    #[case(upstream(500), StatusCode::BAD_GATEWAY)]
    #[case(ProxyError::Internal("secret detail".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn maps_errors_to_statuses(#[case] error: ProxyError, #[case] expected: StatusCode) {
        assert_eq!(error.status_code(), expected);
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let body = ProxyError::Internal("db password wrong".into()).to_error_response();
        assert_eq!(body.code, "INTERNAL_ERROR");
        assert!(!body.message.contains("password"));

        let body = ProxyError::UnknownProvider(UnknownProviderError(
            ProviderName::try_new("ghost".to_string()).unwrap(),
        ))
        .to_error_response();
        assert_eq!(body.code, "PROVIDER_NOT_CONFIGURED");
        assert!(!body.message.contains("ghost"));
    }

    #[test]
    fn upstream_status_is_reported_in_details() {
        let body = upstream(503).to_error_response();
        assert_eq!(body.details, Some(json!({ "upstream_status": 503 })));
    }

    #[test]
    fn failure_response_carries_request_id_and_retry_after() {
        let request_id = RequestId::try_new("req-9".to_string()).unwrap();
        let response = ProxyFailure::new(
            request_id,
            ProxyError::RateLimited {
                retry_after_seconds: 12,
            },
        )
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[X_REQUEST_ID], "req-9");
        assert_eq!(response.headers()[RETRY_AFTER], "12");
    }

    #[test]
    fn validation_errors_use_their_codes() {
        let body = ProxyError::Validation(ValidationError::InvalidRole {
            index: 0,
            role: "tool".into(),
        })
        .to_error_response();
        assert_eq!(body.code, "INVALID_ROLE");
        assert!(body.message.contains("tool"));
    }
}
