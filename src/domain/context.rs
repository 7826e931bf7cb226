//! Per-request context created at ingress

use crate::domain::identifiers::{ClientIdentity, RequestId};
use std::fmt;

/// Opaque caller credential forwarded to upstream providers
///
/// Never printed: `Debug` redacts the value so contexts can be logged.
#[derive(Clone, PartialEq, Eq)]
pub struct InboundCredential(String);

impl InboundCredential {
    /// Blank header values are treated as absent
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for InboundCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InboundCredential(<redacted>)")
    }
}

/// Everything downstream components need to know about the caller
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub client_identity: ClientIdentity,
    pub inbound_auth: Option<InboundCredential>,
}

impl RequestContext {
    pub fn new(
        request_id: RequestId,
        client_identity: ClientIdentity,
        inbound_auth: Option<InboundCredential>,
    ) -> Self {
        Self {
            request_id,
            client_identity,
            inbound_auth,
        }
    }

    /// Context for callers that bypass HTTP ingress (tests, embedding)
    pub fn anonymous() -> Self {
        Self::new(RequestId::generate(), ClientIdentity::anonymous(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_credentials() {
        let context = RequestContext::new(
            RequestId::generate(),
            ClientIdentity::anonymous(),
            InboundCredential::parse("Bearer hunter2"),
        );
        let rendered = format!("{context:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn blank_credentials_are_absent() {
        assert!(InboundCredential::parse("").is_none());
        assert!(InboundCredential::parse("   ").is_none());
        assert_eq!(
            InboundCredential::parse("Bearer x").map(|c| c.expose().to_string()),
            Some("Bearer x".to_string())
        );
    }
}
