//! Adapter for servers exposing the OpenAI Chat Completions API shape
//!
//! Targets local and third-party servers (Ollama, vLLM, llama.cpp, LM Studio,
//! LocalAI). One instance is shared by every alias in the registry.

pub mod errors;
pub mod provider;
pub mod types;

#[cfg(test)]
mod tests;

pub use provider::{resolve_authorization, OpenAiCompatibleProvider};
pub use types::{BaseUrl, OpenAiCompatConfig, UpstreamApiKey};
