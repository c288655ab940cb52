use thiserror::Error;

use crate::{domain::error::DomainError, infra::error::InfraError};

/// Process-level failure reported by the `kudos` binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Exit status for the process: configuration problems are distinguished
    /// from runtime failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Infra(InfraError::Configuration { .. }) | AppError::Validation(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_exit_with_two() {
        let err = AppError::from(InfraError::configuration("missing database url"));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.to_string(),
            "configuration error: missing database url"
        );
        assert_eq!(AppError::unexpected("boom").exit_code(), 1);
    }
}
