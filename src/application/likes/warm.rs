//! Lazy hydration of counters and user-action sets from the durable store.

use metrics::counter;
use tracing::{debug, warn};

use crate::cache::CounterLookup;
use crate::domain::types::{ActionType, CounterScope};

use super::service::LikeService;
use super::types::LikeError;

const METRIC_HYDRATE: &str = "kudos_user_actions_hydrate_total";

impl LikeService {
    /// Owner of the target, marking the target absent when it does not exist.
    pub(super) async fn resolve_target(
        &self,
        action_type: ActionType,
        target_id: i64,
    ) -> Result<Option<i64>, LikeError> {
        let owner = self
            .resolver
            .resolve_owner(action_type, target_id)
            .await
            .map_err(LikeError::store_read)?;
        if owner.is_none()
            && let Err(err) = self
                .counters
                .set_absent(CounterScope::Object(action_type), target_id)
                .await
        {
            warn!(
                target = "kudos::application::likes",
                action_type = %action_type,
                target_id,
                error = %err,
                "Failed to mark missing object in counter cache"
            );
        }
        Ok(owner)
    }

    /// Makes sure the target's counter field holds a count, loading it from the
    /// store when the cache has none. The target is known to exist.
    pub(super) async fn warm_object_counter(
        &self,
        action_type: ActionType,
        target_id: i64,
    ) -> Result<i64, LikeError> {
        let scope = CounterScope::Object(action_type);
        match self
            .counters
            .get(scope, target_id)
            .await
            .map_err(LikeError::cache_read)?
        {
            CounterLookup::Found(count) => Ok(count),
            lookup => {
                let count = self
                    .likes
                    .count_by_target(action_type, target_id)
                    .await
                    .map_err(LikeError::store_read)?;
                self.write_loaded(scope, target_id, count, lookup).await?;
                Ok(count)
            }
        }
    }

    pub(super) async fn warm_owner_counter(&self, owner_id: i64) -> Result<i64, LikeError> {
        let scope = CounterScope::OwnerTotal;
        match self
            .counters
            .get(scope, owner_id)
            .await
            .map_err(LikeError::cache_read)?
        {
            CounterLookup::Found(count) => Ok(count),
            lookup => {
                let count = self
                    .likes
                    .count_by_owner(owner_id)
                    .await
                    .map_err(LikeError::store_read)?;
                self.write_loaded(scope, owner_id, count, lookup).await?;
                Ok(count)
            }
        }
    }

    /// Writes a count loaded from the store without clobbering a toggle that
    /// landed after our read. A stale absent marker is swapped only while it is
    /// still the marker; anything else falls through to a fill-if-missing.
    async fn write_loaded(
        &self,
        scope: CounterScope,
        id: i64,
        count: i64,
        previous: CounterLookup,
    ) -> Result<(), LikeError> {
        if previous == CounterLookup::KnownAbsent
            && self
                .counters
                .replace_absent(scope, id, count)
                .await
                .map_err(LikeError::cache_write)?
        {
            return Ok(());
        }
        self.counters
            .fill(scope, &[(id, count)])
            .await
            .map_err(LikeError::cache_write)
    }

    /// Hydrates the actor's set unless it already carries the hydration marker.
    pub(super) async fn ensure_hydrated(
        &self,
        actor_id: i64,
        action_type: ActionType,
    ) -> Result<(), LikeError> {
        if self
            .user_actions
            .is_hydrated(actor_id, action_type)
            .await
            .map_err(LikeError::cache_read)?
        {
            return Ok(());
        }
        self.hydrate(actor_id, action_type).await
    }

    pub(super) async fn hydrate(
        &self,
        actor_id: i64,
        action_type: ActionType,
    ) -> Result<(), LikeError> {
        let recent = self
            .likes
            .recent_by_actor(actor_id, action_type, 0, self.hydrate_limit)
            .await
            .map_err(LikeError::store_read)?;
        let added = self
            .user_actions
            .hydrate(actor_id, action_type, &recent)
            .await
            .map_err(LikeError::cache_write)?;
        counter!(METRIC_HYDRATE, "action_type" => action_type.as_str()).increment(1);
        debug!(
            target = "kudos::application::likes",
            actor_id,
            action_type = %action_type,
            loaded = recent.len(),
            added,
            "Hydrated user action set"
        );
        Ok(())
    }
}
