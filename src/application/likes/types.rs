use std::fmt;

use thiserror::Error;

use crate::application::events::PublishError;
use crate::application::repos::RepoError;
use crate::cache::CacheError;
use crate::domain::error::DomainError;
use crate::domain::types::ActionType;

/// Whether a failed backend call was reading or writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPath {
    Read,
    Write,
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPath::Read => f.write_str("read"),
            AccessPath::Write => f.write_str("write"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LikeError {
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("{action_type} `{id}` not found")]
    NotFound { action_type: ActionType, id: i64 },
    #[error("{action_type} `{target_id}` is already liked by user `{actor_id}`")]
    AlreadyActive {
        actor_id: i64,
        target_id: i64,
        action_type: ActionType,
    },
    #[error("{action_type} `{target_id}` is not liked by user `{actor_id}`")]
    NotActive {
        actor_id: i64,
        target_id: i64,
        action_type: ActionType,
    },
    #[error("durable store unavailable on {path} path")]
    StoreUnavailable {
        path: AccessPath,
        #[source]
        source: RepoError,
    },
    #[error("cache unavailable on {path} path")]
    CacheUnavailable {
        path: AccessPath,
        #[source]
        source: CacheError,
    },
    #[error(
        "like of {action_type} `{target_id}` by user `{actor_id}` was applied in cache but not recorded"
    )]
    InconsistentState {
        actor_id: i64,
        target_id: i64,
        action_type: ActionType,
        #[source]
        source: RepoError,
    },
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl LikeError {
    pub(crate) fn store_read(source: RepoError) -> Self {
        Self::StoreUnavailable {
            path: AccessPath::Read,
            source,
        }
    }

    pub(crate) fn cache_read(source: CacheError) -> Self {
        Self::CacheUnavailable {
            path: AccessPath::Read,
            source,
        }
    }

    pub(crate) fn cache_write(source: CacheError) -> Self {
        Self::CacheUnavailable {
            path: AccessPath::Write,
            source,
        }
    }

    /// True when repeating the same request may succeed: the failure happened
    /// before anything was applied.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LikeError::StoreUnavailable { .. } | LikeError::CacheUnavailable { .. }
        )
    }

    /// True for the redundant-request errors a caller may safely ignore.
    pub fn is_noop(&self) -> bool {
        matches!(
            self,
            LikeError::AlreadyActive { .. } | LikeError::NotActive { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_path() {
        let err = LikeError::cache_write(CacheError::unavailable("down"));
        assert_eq!(err.to_string(), "cache unavailable on write path");
        let err = LikeError::store_read(RepoError::Timeout);
        assert_eq!(err.to_string(), "durable store unavailable on read path");
    }

    #[test]
    fn only_backend_outages_are_retryable() {
        assert!(LikeError::store_read(RepoError::Timeout).is_retryable());
        assert!(LikeError::cache_write(CacheError::unavailable("down")).is_retryable());
        let inconsistent = LikeError::InconsistentState {
            actor_id: 1,
            target_id: 2,
            action_type: ActionType::Post,
            source: RepoError::Timeout,
        };
        assert!(!inconsistent.is_retryable());
        assert!(
            !LikeError::NotActive {
                actor_id: 1,
                target_id: 2,
                action_type: ActionType::Post,
            }
            .is_retryable()
        );
    }

    #[test]
    fn noop_errors_are_flagged() {
        let already = LikeError::AlreadyActive {
            actor_id: 1,
            target_id: 2,
            action_type: ActionType::Post,
        };
        assert!(already.is_noop());
        assert_eq!(
            already.to_string(),
            "post `2` is already liked by user `1`"
        );
        assert!(
            !LikeError::NotFound {
                action_type: ActionType::Post,
                id: 2
            }
            .is_noop()
        );
    }
}
