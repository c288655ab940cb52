use thiserror::Error;

use crate::domain::types::ActionType;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{action_type} `{id}` not found")]
    NotFound { action_type: ActionType, id: i64 },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn not_found(action_type: ActionType, id: i64) -> Self {
        Self::NotFound { action_type, id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
