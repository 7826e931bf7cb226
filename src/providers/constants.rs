//! Constants for provider interactions
//!
//! String literals, JSON field names and defaults shared by the provider
//! implementations.

/// Label the OpenAI-compatible adapter reports in logs and metrics
pub const OPENAI_COMPAT_LABEL: &str = "openai_compat";

/// Every name the shared OpenAI-compatible provider is registered under
pub const OPENAI_COMPAT_ALIASES: &[&str] = &[
    "ollama",
    "openai",
    "openai_compat",
    "openai-compatible",
    "compat",
    "vllm",
    "localai",
    "lmstudio",
    "llamacpp",
    "llama.cpp",
];

/// Stub provider canned output
pub mod stub {
    pub const RESPONSE_ID: &str = "stub";
    pub const RESPONSE_TEXT: &str = "stub response";
    pub const STREAM_CHUNKS: &[&str] = &["stub ", "response"];
}

/// OpenAI-compatible adapter defaults
pub mod defaults {
    pub const BASE_URL: &str = "http://localhost:11434/v1";
    pub const TIMEOUT_SECONDS: u64 = 600;
    pub const COMPLETION_OBJECT: &str = "chat.completion";
    pub const FINISH_REASON_STOP: &str = "stop";
}

/// Path constants for upstream requests
pub mod paths {
    pub const CHAT_COMPLETIONS: &str = "/chat/completions";
}

/// JSON field names read from upstream error bodies
pub mod json_fields {
    pub const ERROR: &str = "error";
    pub const MESSAGE: &str = "message";
}

/// Server-sent event markers
pub mod sse {
    pub const DONE_SENTINEL: &str = "[DONE]";
}

/// HTTP-related constants
pub mod http {
    pub const BEARER_PREFIX: &str = "Bearer ";

    pub mod content_types {
        pub const APPLICATION_JSON: &str = "application/json";
        pub const TEXT_EVENT_STREAM: &str = "text/event-stream";
    }
}

/// Substrings of a 404 message that mark it as a missing model
pub const MODEL_NOT_FOUND_MARKERS: &[&str] = &["model", "not found", "unknown model"];
