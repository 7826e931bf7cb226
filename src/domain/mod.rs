//! Domain types for the dispatch pipeline
//!
//! Chat payloads, per-request context and the identifiers that correlate a
//! request across validation, rate limiting and provider calls.

pub mod chat;
pub mod context;
pub mod identifiers;

pub use chat::*;
pub use context::{InboundCredential, RequestContext};
pub use identifiers::{ClientIdentity, RequestId};
