//! Repository traits describing persistence adapters.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{LikeActionRecord, RecentLike};
use crate::domain::types::{ActionType, CounterScope};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Desired state of one like row after a toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertLike {
    pub actor_id: i64,
    pub liking_id: i64,
    pub target_owner_id: i64,
    pub action_type: ActionType,
    pub canceled: bool,
    pub at: OffsetDateTime,
}

/// Durable like rows. Every count and listing only considers active
/// (`canceled = false`) rows.
#[async_trait]
pub trait LikesRepo: Send + Sync {
    async fn count_by_target(
        &self,
        action_type: ActionType,
        liking_id: i64,
    ) -> Result<i64, RepoError>;

    /// Counts grouped by target. Targets without active rows are left out.
    async fn count_by_targets(
        &self,
        action_type: ActionType,
        liking_ids: &[i64],
    ) -> Result<HashMap<i64, i64>, RepoError>;

    /// Active likes received across everything `owner_id` owns.
    async fn count_by_owner(&self, owner_id: i64) -> Result<i64, RepoError>;

    async fn count_by_actor(
        &self,
        actor_id: i64,
        action_type: ActionType,
    ) -> Result<i64, RepoError>;

    /// Most recently updated likes of `actor_id`, newest first.
    async fn recent_by_actor(
        &self,
        actor_id: i64,
        action_type: ActionType,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<RecentLike>, RepoError>;

    async fn find_like(
        &self,
        actor_id: i64,
        liking_id: i64,
        action_type: ActionType,
    ) -> Result<Option<LikeActionRecord>, RepoError>;

    /// Inserts the row or, when (actor, target, action type) already exists,
    /// updates its `canceled`, owner and `updated_at`.
    async fn upsert_like(&self, like: UpsertLike) -> Result<LikeActionRecord, RepoError>;
}

/// Existence and ownership of likeable objects.
#[async_trait]
pub trait ObjectResolver: Send + Sync {
    /// Owner of the object, `None` when it does not exist.
    async fn resolve_owner(
        &self,
        action_type: ActionType,
        object_id: i64,
    ) -> Result<Option<i64>, RepoError>;
}

/// Persisted aggregate counters.
#[async_trait]
pub trait CounterWriteRepo: Send + Sync {
    /// Assigns every count as-is; returns the number of rows updated.
    async fn apply_counts(
        &self,
        scope: CounterScope,
        counts: &BTreeMap<i64, i64>,
    ) -> Result<u64, RepoError>;
}
