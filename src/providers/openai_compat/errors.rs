//! Mapping of non-success upstream responses onto `ProviderError`

use crate::providers::constants::{json_fields, MODEL_NOT_FOUND_MARKERS};
use crate::providers::ProviderError;
use hyper::header::RETRY_AFTER;
use hyper::{HeaderMap, StatusCode};
use serde_json::Value;

/// Best-effort human message from an upstream error body
///
/// Accepts `{"error": "..."}`, `{"error": {"message": "..."}}` and
/// `{"message": "..."}`; anything else yields an empty string.
pub fn error_message(body: &[u8]) -> String {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return String::new();
    };

    let from_error = match value.get(json_fields::ERROR) {
        Some(Value::String(message)) => Some(message.clone()),
        Some(Value::Object(error)) => error
            .get(json_fields::MESSAGE)
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };

    from_error
        .or_else(|| {
            value
                .get(json_fields::MESSAGE)
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default()
}

fn retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// True when a 404 message names the requested model explicitly
fn mentions_missing_model(message: &str, model: &str) -> bool {
    let lowered = message.to_lowercase();
    let compact_message: String = lowered.chars().filter(|c| *c != ' ').collect();
    let compact_model: String = model
        .to_lowercase()
        .chars()
        .filter(|c| *c != ' ')
        .collect();

    !compact_model.is_empty()
        && MODEL_NOT_FOUND_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
        && compact_message.contains(&compact_model)
}

fn or_default(message: String, default: impl FnOnce() -> String) -> String {
    if message.is_empty() {
        default()
    } else {
        message
    }
}

/// Translate a non-2xx upstream response
pub fn map_upstream_status(
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
    model: &str,
) -> ProviderError {
    let message = error_message(body);

    match status {
        StatusCode::UNAUTHORIZED => {
            ProviderError::Unauthorized(or_default(message, || "Unauthorized".to_string()))
        }
        StatusCode::FORBIDDEN => {
            ProviderError::Forbidden(or_default(message, || "Forbidden".to_string()))
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            message: or_default(message, || "Rate Limited".to_string()),
            retry_after_seconds: retry_after_seconds(headers),
        },
        StatusCode::NOT_FOUND if mentions_missing_model(&message, model) => {
            ProviderError::ModelNotFound(message)
        }
        _ => ProviderError::UpstreamStatus {
            status: status.as_u16(),
            message: or_default(message, || {
                status
                    .canonical_reason()
                    .unwrap_or("Upstream error")
                    .to_string()
            }),
        },
    }
}
