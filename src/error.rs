use thiserror::Error;

/// Switchboard application error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_setting(field: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::InvalidSetting {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
