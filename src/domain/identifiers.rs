//! Identifiers threaded through a single proxied request
//!
//! `RequestId` correlates logs, metrics and responses; `ClientIdentity`
//! partitions rate-limit state between callers.

use nutype::nutype;
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use uuid::Uuid;

/// Number of hex characters kept from the credential digest
const CREDENTIAL_FINGERPRINT_LEN: usize = 16;

/// Correlation id attached to every response
///
/// Ids supplied by callers are opaque and echoed unchanged, whatever their
/// length; generated ids are UUID v7 so they sort by creation time.
#[nutype(
    validate(predicate = |id: &str| !id.trim().is_empty()),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        AsRef
    )
)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self::try_new(Uuid::now_v7().to_string()).expect("UUID strings are never empty")
    }

    /// Use the caller-supplied id unless it is blank, otherwise mint a new one
    pub fn from_header_or_generate(value: Option<&str>) -> Self {
        value
            .and_then(|raw| Self::try_new(raw.to_string()).ok())
            .unwrap_or_else(Self::generate)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::generate()
    }
}

/// Key used to partition rate-limit state between callers
#[nutype(
    validate(not_empty, len_char_max = 128),
    derive(Debug, Clone, PartialEq, Eq, Hash, Display, AsRef)
)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub const ANONYMOUS: &'static str = "anonymous";

    /// Credential-derived identity; only a digest prefix of the secret is kept
    pub fn from_credential(credential: &str) -> Self {
        let digest = hex::encode(Sha256::digest(credential.as_bytes()));
        Self::try_new(format!(
            "cred:{}",
            &digest[..CREDENTIAL_FINGERPRINT_LEN]
        ))
        .expect("credential fingerprint is never empty")
    }

    pub fn from_peer(addr: IpAddr) -> Self {
        Self::try_new(format!("ip:{addr}")).expect("peer identity is never empty")
    }

    pub fn anonymous() -> Self {
        Self::try_new(Self::ANONYMOUS.to_string()).expect("ANONYMOUS constant is valid")
    }

    /// Credential first, then network origin, then the shared anonymous bucket
    pub fn derive(credential: Option<&str>, peer: Option<IpAddr>) -> Self {
        match (credential.map(str::trim).filter(|c| !c.is_empty()), peer) {
            (Some(credential), _) => Self::from_credential(credential),
            (None, Some(addr)) => Self::from_peer(addr),
            (None, None) => Self::anonymous(),
        }
    }
}
