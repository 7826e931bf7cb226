//! Structural and semantic checks on inbound chat requests
//!
//! Validation is pure: it never touches the rate limiter or a provider.

use crate::domain::{
    ChatCompletionPayload, ChatMessage, ChatRequest, MessageContent, ModelName, Role,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Model must not be empty")]
    EmptyModel,

    #[error("Messages must not be empty")]
    EmptyMessages,

    #[error("Invalid role '{role}' at message {index}")]
    InvalidRole { index: usize, role: String },

    #[error("Message content must not be empty (message {index})")]
    EmptyContent { index: usize },

    #[error("Last message must not be from the assistant")]
    TrailingAssistant,
}

impl ValidationError {
    /// Stable code for error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyModel => "EMPTY_MODEL",
            Self::EmptyMessages => "EMPTY_MESSAGES",
            Self::InvalidRole { .. } => "INVALID_ROLE",
            Self::EmptyContent { .. } => "EMPTY_CONTENT",
            Self::TrailingAssistant => "TRAILING_ASSISTANT",
        }
    }
}

/// Turn a raw payload into a [`ChatRequest`], failing on the first violation
///
/// Checks run in order: model, message count, every role, every content,
/// then the trailing-assistant rule.
pub fn validate(payload: ChatCompletionPayload) -> Result<ChatRequest, ValidationError> {
    let ChatCompletionPayload {
        model,
        messages,
        params,
    } = payload;

    let model = ModelName::try_new(model).map_err(|_| ValidationError::EmptyModel)?;

    if messages.is_empty() {
        return Err(ValidationError::EmptyMessages);
    }

    let roles = messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            Role::parse(&message.role).ok_or_else(|| ValidationError::InvalidRole {
                index,
                role: message.role.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let validated = messages
        .into_iter()
        .zip(roles)
        .enumerate()
        .map(|(index, (message, role))| {
            MessageContent::try_new(message.content)
                .map(|content| ChatMessage::new(role, content))
                .map_err(|_| ValidationError::EmptyContent { index })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if validated
        .last()
        .is_some_and(|message| message.role() == Role::Assistant)
    {
        return Err(ValidationError::TrailingAssistant);
    }

    Ok(ChatRequest::new(model, validated, params))
}
