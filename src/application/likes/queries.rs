use std::collections::HashMap;

use tracing::warn;

use crate::application::pagination::LikedPage;
use crate::cache::{CounterLookup, Membership};
use crate::domain::likes::ensure_object_id;
use crate::domain::types::{ActionType, CounterScope};

use super::service::LikeService;
use super::types::LikeError;

impl LikeService {
    /// Whether `actor_id` currently likes the target, hydrating the actor's set
    /// on first use.
    pub async fn is_liking(
        &self,
        actor_id: i64,
        target_id: i64,
        action_type: ActionType,
    ) -> Result<bool, LikeError> {
        ensure_object_id(actor_id, "actor_id")?;
        ensure_object_id(target_id, "target_id")?;

        match self.membership(actor_id, action_type, target_id).await? {
            Membership::Active(_) => return Ok(true),
            Membership::Inactive => return Ok(false),
            Membership::Cold => self.hydrate(actor_id, action_type).await?,
        }

        match self.membership(actor_id, action_type, target_id).await? {
            Membership::Active(_) => Ok(true),
            Membership::Inactive => Ok(false),
            Membership::Cold => {
                let record = self
                    .likes
                    .find_like(actor_id, target_id, action_type)
                    .await
                    .map_err(LikeError::store_read)?;
                Ok(record.is_some_and(|record| record.is_active()))
            }
        }
    }

    /// Liked object ids of `actor_id`, most recent first.
    ///
    /// Served from the actor's set; the durable store answers when the set
    /// cannot be hydrated.
    pub async fn list_liked_objects(
        &self,
        actor_id: i64,
        action_type: ActionType,
        page: i64,
        page_size: i64,
    ) -> Result<LikedPage, LikeError> {
        ensure_object_id(actor_id, "actor_id")?;

        match self.cached_page(actor_id, action_type, page, page_size).await {
            Ok(Some(listed)) => return Ok(listed),
            Ok(None) => {}
            Err(err @ LikeError::CacheUnavailable { .. }) => warn!(
                target = "kudos::application::likes",
                actor_id,
                action_type = %action_type,
                error = %err,
                "Listing liked objects from the durable store"
            ),
            Err(err) => return Err(err),
        }

        let total = self
            .likes
            .count_by_actor(actor_id, action_type)
            .await
            .map_err(LikeError::store_read)?;
        let total = u64::try_from(total).unwrap_or(0);
        let window = self.bounds.window(page, page_size, total);
        let recent = self
            .likes
            .recent_by_actor(actor_id, action_type, window.offset(), window.page_size)
            .await
            .map_err(LikeError::store_read)?;
        Ok(LikedPage {
            ids: recent.into_iter().map(|like| like.liking_id).collect(),
            total,
            page: window.page,
            page_size: window.page_size,
        })
    }

    async fn cached_page(
        &self,
        actor_id: i64,
        action_type: ActionType,
        page: i64,
        page_size: i64,
    ) -> Result<Option<LikedPage>, LikeError> {
        self.ensure_hydrated(actor_id, action_type).await?;
        let Some(total) = self
            .user_actions
            .len(actor_id, action_type)
            .await
            .map_err(LikeError::cache_read)?
        else {
            return Ok(None);
        };

        let total = total as u64;
        let window = self.bounds.window(page, page_size, total);
        let offset = usize::try_from(window.offset()).unwrap_or(usize::MAX);
        let ids = self
            .user_actions
            .page(actor_id, action_type, offset, window.page_size as usize)
            .await
            .map_err(LikeError::cache_read)?;
        Ok(Some(LikedPage {
            ids,
            total,
            page: window.page,
            page_size: window.page_size,
        }))
    }

    /// Like count of the target and whether the target exists.
    pub async fn like_count(
        &self,
        target_id: i64,
        action_type: ActionType,
    ) -> Result<(i64, bool), LikeError> {
        ensure_object_id(target_id, "target_id")?;

        let lookup = self
            .counters
            .get(CounterScope::Object(action_type), target_id)
            .await
            .map_err(LikeError::cache_read)?;
        match lookup {
            CounterLookup::Found(count) => Ok((count, true)),
            CounterLookup::KnownAbsent => Ok((0, false)),
            CounterLookup::Unknown => {
                if self.resolve_target(action_type, target_id).await?.is_none() {
                    return Ok((0, false));
                }
                let count = self.warm_object_counter(action_type, target_id).await?;
                Ok((count, true))
            }
        }
    }

    /// Every cached count of `action_type`, merged across shards.
    pub async fn batch_like_count(
        &self,
        action_type: ActionType,
    ) -> Result<HashMap<i64, i64>, LikeError> {
        let merged = self
            .counters
            .scan(CounterScope::Object(action_type))
            .await
            .map_err(LikeError::cache_read)?;
        Ok(merged.into_iter().collect())
    }

    /// Counts for `ids`. Ids the cache does not know are counted in one grouped
    /// query and written back; ids known to be absent are left out.
    pub async fn batch_like_count_by_ids(
        &self,
        ids: &[i64],
        action_type: ActionType,
    ) -> Result<HashMap<i64, i64>, LikeError> {
        for &id in ids {
            ensure_object_id(id, "ids")?;
        }
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let scope = CounterScope::Object(action_type);
        let lookups = self
            .counters
            .get_many(scope, ids)
            .await
            .map_err(LikeError::cache_read)?;

        let mut counts = HashMap::with_capacity(lookups.len());
        let mut missing = Vec::new();
        for (id, lookup) in lookups {
            match lookup {
                CounterLookup::Found(count) => {
                    counts.insert(id, count);
                }
                CounterLookup::KnownAbsent => {}
                CounterLookup::Unknown => missing.push(id),
            }
        }
        if missing.is_empty() {
            return Ok(counts);
        }

        missing.sort_unstable();
        let stored = self
            .likes
            .count_by_targets(action_type, &missing)
            .await
            .map_err(LikeError::store_read)?;
        let loaded: Vec<(i64, i64)> = missing
            .iter()
            .map(|id| (*id, stored.get(id).copied().unwrap_or(0)))
            .collect();
        self.counters
            .fill(scope, &loaded)
            .await
            .map_err(LikeError::cache_write)?;
        counts.extend(loaded);
        Ok(counts)
    }

    async fn membership(
        &self,
        actor_id: i64,
        action_type: ActionType,
        target_id: i64,
    ) -> Result<Membership, LikeError> {
        self.user_actions
            .membership(actor_id, action_type, target_id)
            .await
            .map_err(LikeError::cache_read)
    }
}
