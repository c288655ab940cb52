//! Per-user sets of recently liked objects.
//!
//! A set is only trusted once it carries [`HYDRATED_MEMBER`]; the marker is added
//! in the same call as the hydration batch, so a set either holds the store's
//! recent likes plus live changes or is treated as missing.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::entities::RecentLike;
use crate::domain::types::ActionType;

use super::error::CacheError;
use super::keys::{member, user_actions_key};
use super::store::CacheClient;

pub(crate) const HYDRATED_MEMBER: &str = "__hydrated__";
pub(crate) const HYDRATED_SCORE: i64 = -1;

/// Membership of one object in a user's set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Liked; carries the last action time in unix seconds.
    Active(i64),
    Inactive,
    /// The set is not hydrated.
    Cold,
}

#[derive(Clone)]
pub struct UserActionSet {
    client: Arc<dyn CacheClient>,
    ttl: Duration,
}

impl UserActionSet {
    pub fn new(client: Arc<dyn CacheClient>, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    pub fn key(&self, actor_id: i64, action_type: ActionType) -> String {
        user_actions_key(actor_id, action_type)
    }

    pub async fn is_hydrated(
        &self,
        actor_id: i64,
        action_type: ActionType,
    ) -> Result<bool, CacheError> {
        let key = self.key(actor_id, action_type);
        Ok(self.client.zscore(&key, HYDRATED_MEMBER).await?.is_some())
    }

    pub async fn membership(
        &self,
        actor_id: i64,
        action_type: ActionType,
        object_id: i64,
    ) -> Result<Membership, CacheError> {
        let key = self.key(actor_id, action_type);
        if let Some(score) = self.client.zscore(&key, &member(object_id)).await?
            && score >= 0
        {
            return Ok(Membership::Active(score));
        }
        if self.client.zscore(&key, HYDRATED_MEMBER).await?.is_some() {
            Ok(Membership::Inactive)
        } else {
            Ok(Membership::Cold)
        }
    }

    /// Adds `likes` and the hydration marker without overwriting existing members.
    /// A set that is already hydrated is left as is, since `likes` may predate
    /// toggles applied to it. Returns how many members were new.
    pub async fn hydrate(
        &self,
        actor_id: i64,
        action_type: ActionType,
        likes: &[RecentLike],
    ) -> Result<usize, CacheError> {
        let key = self.key(actor_id, action_type);
        let mut members: Vec<(String, i64)> = likes
            .iter()
            .map(|like| (member(like.liking_id), like.updated_at.unix_timestamp()))
            .collect();
        members.push((HYDRATED_MEMBER.to_string(), HYDRATED_SCORE));
        let added = self
            .client
            .zadd_nx_unless(&key, HYDRATED_MEMBER, &members, self.ttl)
            .await?;
        Ok(added.unwrap_or(0))
    }

    /// Number of liked objects, `None` when the set is not hydrated.
    pub async fn len(
        &self,
        actor_id: i64,
        action_type: ActionType,
    ) -> Result<Option<usize>, CacheError> {
        if !self.is_hydrated(actor_id, action_type).await? {
            return Ok(None);
        }
        let key = self.key(actor_id, action_type);
        let card = self.client.zcard(&key).await?;
        Ok(Some(card.saturating_sub(1)))
    }

    /// Object ids by most recent action first.
    pub async fn page(
        &self,
        actor_id: i64,
        action_type: ActionType,
        offset: usize,
        count: usize,
    ) -> Result<Vec<i64>, CacheError> {
        let key = self.key(actor_id, action_type);
        let members = self
            .client
            .zrevrange_by_score(&key, 0, offset, count)
            .await?;
        members
            .into_iter()
            .map(|raw| {
                raw.parse::<i64>()
                    .map_err(|_| CacheError::malformed(&key, format!("member `{raw}` is not an id")))
            })
            .collect()
    }

    /// Drops the whole set; the next read hydrates it again.
    pub async fn evict(&self, actor_id: i64, action_type: ActionType) -> Result<bool, CacheError> {
        let key = self.key(actor_id, action_type);
        self.client.delete(&key).await
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::cache::store::MemoryKeyspace;

    fn set() -> UserActionSet {
        UserActionSet::new(Arc::new(MemoryKeyspace::new()), Duration::from_secs(60))
    }

    fn recent(liking_id: i64, unix: i64) -> RecentLike {
        RecentLike {
            liking_id,
            updated_at: OffsetDateTime::from_unix_timestamp(unix).expect("timestamp"),
        }
    }

    #[tokio::test]
    async fn unhydrated_set_is_cold() {
        let set = set();
        assert_eq!(
            set.membership(1, ActionType::Post, 5).await.expect("membership"),
            Membership::Cold
        );
        assert_eq!(set.len(1, ActionType::Post).await.expect("len"), None);
    }

    #[tokio::test]
    async fn hydration_marks_set_and_excludes_marker_from_views() {
        let set = set();
        let likes = [recent(5, 100), recent(6, 300), recent(7, 200)];
        let added = set
            .hydrate(1, ActionType::Post, &likes)
            .await
            .expect("hydrate");
        assert_eq!(added, 4);

        assert_eq!(
            set.membership(1, ActionType::Post, 6).await.expect("membership"),
            Membership::Active(300)
        );
        assert_eq!(
            set.membership(1, ActionType::Post, 8).await.expect("membership"),
            Membership::Inactive
        );
        assert_eq!(set.len(1, ActionType::Post).await.expect("len"), Some(3));
        assert_eq!(
            set.page(1, ActionType::Post, 0, 10).await.expect("page"),
            vec![6, 7, 5]
        );
    }

    #[tokio::test]
    async fn concurrent_hydrations_converge() {
        let set = set();
        let likes = [recent(5, 100), recent(6, 300)];
        let (a, b) = tokio::join!(
            set.hydrate(1, ActionType::Comment, &likes),
            set.hydrate(1, ActionType::Comment, &likes)
        );
        assert_eq!(a.expect("first") + b.expect("second"), 3);
        assert_eq!(set.len(1, ActionType::Comment).await.expect("len"), Some(2));
    }

    #[tokio::test]
    async fn stale_hydration_does_not_restore_removed_likes() {
        let set = set();
        set.hydrate(2, ActionType::Post, &[recent(5, 100)])
            .await
            .expect("hydrate");
        set.hydrate(2, ActionType::Post, &[recent(5, 100), recent(9, 150)])
            .await
            .expect("late hydrate");
        assert_eq!(
            set.membership(2, ActionType::Post, 9).await.expect("membership"),
            Membership::Inactive
        );
        assert_eq!(set.len(2, ActionType::Post).await.expect("len"), Some(1));
    }

    #[tokio::test]
    async fn hydrating_empty_history_still_marks_set() {
        let set = set();
        set.hydrate(3, ActionType::User, &[]).await.expect("hydrate");
        assert!(set.is_hydrated(3, ActionType::User).await.expect("hydrated"));
        assert_eq!(set.len(3, ActionType::User).await.expect("len"), Some(0));
        assert!(set.evict(3, ActionType::User).await.expect("evict"));
        assert!(!set.is_hydrated(3, ActionType::User).await.expect("hydrated"));
    }
}
