//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::types::ActionType;

/// One durable like row. At most one row exists per (actor, target, action type);
/// unliking flips `canceled` instead of deleting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LikeActionRecord {
    pub actor_id: i64,
    pub liking_id: i64,
    pub target_owner_id: i64,
    pub action_type: ActionType,
    pub canceled: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl LikeActionRecord {
    pub fn is_active(&self) -> bool {
        !self.canceled
    }
}

/// An entry of a user's recent likes: the liked object and when it was last liked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecentLike {
    pub liking_id: i64,
    pub updated_at: OffsetDateTime,
}
