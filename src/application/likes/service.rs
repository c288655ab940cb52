use std::sync::Arc;

use crate::application::events::EventPublisher;
use crate::application::pagination::PageBounds;
use crate::application::repos::{LikesRepo, ObjectResolver};
use crate::cache::{CacheClient, CacheConfig, CounterCache, ShardResolver, UserActionSet};

/// Like/unlike bookkeeping with cache-first reads.
///
/// Counters and per-user sets live in the cache keyspace; like rows live in the
/// durable store. Aggregate counter columns are only written by the flush
/// pipeline (see [`crate::application::jobs`]).
#[derive(Clone)]
pub struct LikeService {
    pub(super) likes: Arc<dyn LikesRepo>,
    pub(super) resolver: Arc<dyn ObjectResolver>,
    pub(super) publisher: Arc<dyn EventPublisher>,
    pub(super) cache: Arc<dyn CacheClient>,
    pub(super) counters: CounterCache,
    pub(super) user_actions: UserActionSet,
    pub(super) bounds: PageBounds,
    pub(super) hydrate_limit: u32,
}

impl LikeService {
    pub fn new(
        likes: Arc<dyn LikesRepo>,
        resolver: Arc<dyn ObjectResolver>,
        publisher: Arc<dyn EventPublisher>,
        cache: Arc<dyn CacheClient>,
        config: &CacheConfig,
        bounds: PageBounds,
    ) -> Self {
        let shards = ShardResolver::new(config.shard_count_non_zero());
        let counters = CounterCache::new(cache.clone(), shards, config.counter_ttl());
        let user_actions = UserActionSet::new(cache.clone(), config.user_actions_ttl());
        Self {
            likes,
            resolver,
            publisher,
            cache,
            counters,
            user_actions,
            bounds,
            hydrate_limit: u32::try_from(config.hydrate_limit).unwrap_or(u32::MAX),
        }
    }

    pub fn counters(&self) -> &CounterCache {
        &self.counters
    }

    pub fn user_actions(&self) -> &UserActionSet {
        &self.user_actions
    }
}
