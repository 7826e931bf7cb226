//! Provider abstraction and registry for chat-completion backends
//!
//! Every backend implements [`Provider`]: a unary `generate` and a lazy
//! `stream`. The [`ProviderRegistry`] maps logical provider names to shared
//! provider instances and is read-only once the service starts.

pub mod constants;
pub mod openai_compat;
pub mod stub;

use crate::domain::{ChatRequest, ChatResponse, RequestContext, StreamChunk};
use async_trait::async_trait;
use futures_util::Stream;
use nutype::nutype;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use self::openai_compat::{OpenAiCompatConfig, OpenAiCompatibleProvider};
use self::stub::StubProvider;

/// Provider name newtype; names are case-insensitive
#[nutype(
    sanitize(trim, lowercase),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Serialize,
        Deserialize,
        Display,
        AsRef
    )
)]
pub struct ProviderName(String);

impl ProviderName {
    pub const STUB: &'static str = "stub";

    pub fn stub() -> Self {
        Self::try_new(Self::STUB.to_string()).expect("STUB constant is a valid provider name")
    }
}

/// Lazy, finite, non-restartable sequence of chunks
///
/// Dropping the stream releases whatever upstream resources back it.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Core provider trait for chat-completion backends
#[async_trait]
pub trait Provider: Send + Sync {
    /// Label used in logs and metrics
    fn label(&self) -> &str;

    /// Produce a complete response in one round trip
    async fn generate(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<ChatResponse, ProviderError>;

    /// Open a chunk stream
    ///
    /// Failures before the first chunk (connect, upstream status) are returned
    /// here; failures after that surface as stream items.
    async fn stream(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<ChunkStream, ProviderError>;
}

/// Provider-specific error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("Upstream rejected credentials: {0}")]
    Unauthorized(String),

    #[error("Upstream denied access: {0}")]
    Forbidden(String),

    #[error("Upstream rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Upstream returned {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Could not build upstream request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Short outcome label for metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::Timeout(_) => "timeout",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::RateLimited { .. } => "rate_limited",
            Self::ModelNotFound(_) => "model_not_found",
            Self::UpstreamStatus { .. } => "upstream_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// Lookup of a name nothing was registered under
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("No provider registered under '{0}'")]
pub struct UnknownProviderError(pub ProviderName);

/// Registry of all available providers
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderName, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create an empty provider registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Stub plus one shared OpenAI-compatible client under every known alias
    pub fn with_defaults(openai_compat: OpenAiCompatConfig) -> Self {
        let mut registry = Self::new();
        registry.register(ProviderName::stub(), Arc::new(StubProvider::new()));

        let compatible: Arc<dyn Provider> = Arc::new(OpenAiCompatibleProvider::new(openai_compat));
        for alias in constants::OPENAI_COMPAT_ALIASES {
            let name = ProviderName::try_new(alias.to_string())
                .expect("OPENAI_COMPAT_ALIASES entries are valid provider names");
            registry.register(name, Arc::clone(&compatible));
        }
        registry
    }

    /// Register a provider, replacing any previous registration under `name`
    pub fn register(&mut self, name: ProviderName, provider: Arc<dyn Provider>) {
        self.providers.insert(name, provider);
    }

    pub fn resolve_provider(
        &self,
        name: &ProviderName,
    ) -> Result<Arc<dyn Provider>, UnknownProviderError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| UnknownProviderError(name.clone()))
    }

    pub fn contains(&self, name: &ProviderName) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<ProviderName> {
        let mut names: Vec<_> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}
