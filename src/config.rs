//! Layered service configuration
//!
//! Values come from built-in defaults, then the optional `config/default`,
//! `config/{environment}` and `config/local` files, then `SWITCHBOARD__*`
//! environment variables (`SWITCHBOARD__RATE_LIMIT__ENABLED=true`).

use crate::error::{Error, Result};
use crate::providers::openai_compat::{BaseUrl, OpenAiCompatConfig, UpstreamApiKey};
use crate::providers::constants::defaults;
use crate::providers::ProviderName;
use crate::proxy::middleware::{AuthConfig, LoggingConfig};
use crate::proxy::middleware_stack::{CorsConfig, ProxyMiddlewareConfig};
use crate::proxy::model_router::ProviderRules;
use crate::proxy::rate_limiter::{MaxRequests, RateLimitConfig, WindowSeconds};
use crate::proxy::types::{ApiKey, ProxyConfig, RequestSizeLimit};
use ::config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

pub use ::config::ConfigError;

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "SWITCHBOARD";

/// Log output formats accepted by `logging.format`
pub const LOG_FORMAT_JSON: &str = "json";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub routing: RoutingSettings,
    pub openai_compat: OpenAiCompatSettings,
    pub rate_limit: RateLimitSettings,
    pub http: HttpSettings,
    pub auth: AuthSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub environment: String,
    /// Reported by `/healthz`; defaults to the crate version
    pub version: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutingSettings {
    pub default_provider: String,
    /// `pattern=provider` pairs separated by commas, e.g. `gpt-4=ollama,local-*=stub`
    pub model_provider_map: String,
}

#[derive(Deserialize, Clone)]
pub struct OpenAiCompatSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl std::fmt::Debug for OpenAiCompatSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub window_seconds: u64,
    pub max_requests: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpSettings {
    /// Zero disables the body size limit
    pub max_request_bytes: usize,
    pub require_authorization: bool,
    /// Comma separated; `*` allows any origin
    pub cors_allow_origins: String,
}

#[derive(Deserialize, Clone)]
pub struct AuthSettings {
    pub enabled: bool,
    /// Comma separated list of accepted `X-API-Key` values
    pub api_keys: String,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("enabled", &self.enabled)
            .field("api_keys", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
    pub log_requests: bool,
}

impl LoggingSettings {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case(LOG_FORMAT_JSON)
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}

impl Settings {
    pub fn new() -> std::result::Result<Self, ConfigError> {
        Self::with_overrides(std::iter::empty::<(&str, &str)>())
    }

    /// Load settings with explicit key overrides applied last
    pub fn with_overrides<'a, I>(overrides: I) -> std::result::Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = Self::defaults(Config::builder(), &environment)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        for (key, value) in overrides {
            builder = builder.set_override(key, value)?;
        }

        builder.build()?.try_deserialize()
    }

    fn defaults(
        builder: ConfigBuilder<::config::builder::DefaultState>,
        environment: &str,
    ) -> std::result::Result<ConfigBuilder<::config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("server.environment", environment)?
            .set_default("routing.default_provider", ProviderName::STUB)?
            .set_default("routing.model_provider_map", "")?
            .set_default("openai_compat.base_url", defaults::BASE_URL)?
            .set_default("openai_compat.timeout_seconds", defaults::TIMEOUT_SECONDS)?
            .set_default("rate_limit.enabled", false)?
            .set_default("rate_limit.window_seconds", 60)?
            .set_default("rate_limit.max_requests", 60)?
            .set_default("http.max_request_bytes", 0)?
            .set_default("http.require_authorization", true)?
            .set_default("http.cors_allow_origins", "*")?
            .set_default("auth.enabled", false)?
            .set_default("auth.api_keys", "")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("logging.log_requests", false)
    }

    /// Typed dispatch configuration; invalid values fail here, not per request
    pub fn proxy_config(&self) -> Result<ProxyConfig> {
        let default_provider = ProviderName::try_new(self.routing.default_provider.clone())
            .map_err(|e| Error::invalid_setting("routing.default_provider", e))?;

        let base_url = BaseUrl::try_new(self.openai_compat.base_url.clone())
            .map_err(|e| Error::invalid_setting("openai_compat.base_url", e))?;
        if self.openai_compat.timeout_seconds == 0 {
            return Err(Error::invalid_setting(
                "openai_compat.timeout_seconds",
                "must be greater than zero",
            ));
        }

        let rate_limit = RateLimitConfig::new(
            self.rate_limit.enabled,
            WindowSeconds::try_new(self.rate_limit.window_seconds)
                .map_err(|e| Error::invalid_setting("rate_limit.window_seconds", e))?,
            MaxRequests::try_new(self.rate_limit.max_requests)
                .map_err(|e| Error::invalid_setting("rate_limit.max_requests", e))?,
        );

        let max_request_size = match self.http.max_request_bytes {
            0 => None,
            bytes => Some(
                RequestSizeLimit::try_new(bytes)
                    .map_err(|e| Error::invalid_setting("http.max_request_bytes", e))?,
            ),
        };

        Ok(ProxyConfig {
            default_provider,
            provider_rules: ProviderRules::parse(&self.routing.model_provider_map),
            openai_compat: OpenAiCompatConfig {
                base_url,
                api_key: self
                    .openai_compat
                    .api_key
                    .as_deref()
                    .and_then(UpstreamApiKey::parse),
                timeout: Duration::from_secs(self.openai_compat.timeout_seconds),
            },
            rate_limit,
            max_request_size,
            require_authorization: self.http.require_authorization,
            service_version: self
                .server
                .version
                .clone()
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        })
    }

    pub fn middleware_config(&self) -> ProxyMiddlewareConfig {
        let api_keys = split_list(&self.auth.api_keys)
            .filter_map(|key| ApiKey::try_new(key.to_string()).ok())
            .collect();

        ProxyMiddlewareConfig::default()
            .with_auth(AuthConfig {
                enabled: self.auth.enabled,
                api_keys,
            })
            .with_logging(LoggingConfig {
                log_requests: self.logging.log_requests,
                level: self.logging.level.clone(),
            })
            .with_cors(CorsConfig::from_origins(split_list(
                &self.http.cors_allow_origins,
            )))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
