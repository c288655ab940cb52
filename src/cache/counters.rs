//! Sharded like counters.
//!
//! Each counter scope spreads its object ids over `shard_count` hashes. A field
//! holding [`ABSENT_MARKER`] records that the object was checked and does not
//! exist; callers only ever see that state as [`CounterLookup::KnownAbsent`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::warn;

use crate::domain::types::CounterScope;

use super::error::CacheError;
use super::keys::{ShardResolver, counter_shard_key, member};
use super::store::{CacheClient, CounterField};

pub(crate) const ABSENT_MARKER: i64 = -1;

const METRIC_COUNTER_HIT: &str = "kudos_counter_cache_hit_total";
const METRIC_COUNTER_MISS: &str = "kudos_counter_cache_miss_total";

/// What the counter cache knows about one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterLookup {
    Found(i64),
    KnownAbsent,
    Unknown,
}

impl CounterLookup {
    fn from_raw(raw: Option<i64>) -> Self {
        match raw {
            None => CounterLookup::Unknown,
            Some(ABSENT_MARKER) => CounterLookup::KnownAbsent,
            Some(count) => CounterLookup::Found(count.max(0)),
        }
    }

    fn record(self, scope: CounterScope) {
        let scope = scope.as_str();
        match self {
            CounterLookup::Unknown => counter!(METRIC_COUNTER_MISS, "scope" => scope).increment(1),
            _ => counter!(METRIC_COUNTER_HIT, "scope" => scope).increment(1),
        }
    }
}

#[derive(Clone)]
pub struct CounterCache {
    client: Arc<dyn CacheClient>,
    shards: ShardResolver,
    ttl: Duration,
}

impl CounterCache {
    pub fn new(client: Arc<dyn CacheClient>, shards: ShardResolver, ttl: Duration) -> Self {
        Self {
            client,
            shards,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Location of `id` within `scope`, as used by the atomic toggle.
    pub fn field(&self, scope: CounterScope, id: i64) -> CounterField {
        CounterField {
            key: self.shards.counter_key(scope, id),
            field: member(id),
        }
    }

    pub async fn get(&self, scope: CounterScope, id: i64) -> Result<CounterLookup, CacheError> {
        let key = self.shards.counter_key(scope, id);
        let raw = self.client.hash_get(&key, &member(id)).await?;
        let lookup = CounterLookup::from_raw(raw);
        lookup.record(scope);
        Ok(lookup)
    }

    /// Looks up every id, touching each shard once.
    pub async fn get_many(
        &self,
        scope: CounterScope,
        ids: &[i64],
    ) -> Result<HashMap<i64, CounterLookup>, CacheError> {
        let mut found = HashMap::with_capacity(ids.len());
        for (shard, shard_ids) in self.partition(ids) {
            let key = counter_shard_key(scope, shard);
            let fields: Vec<String> = shard_ids.iter().copied().map(member).collect();
            let values = self.client.hash_get_many(&key, &fields).await?;
            for (id, raw) in shard_ids.into_iter().zip(values) {
                let lookup = CounterLookup::from_raw(raw);
                lookup.record(scope);
                found.insert(id, lookup);
            }
        }
        Ok(found)
    }

    /// Overwrites counts, grouped by shard.
    #[cfg(test)]
    pub(crate) async fn store(&self, scope: CounterScope, counts: &[(i64, i64)]) -> Result<(), CacheError> {
        for (shard, entries) in self.group(counts) {
            let key = counter_shard_key(scope, shard);
            self.client.hash_set_many(&key, &entries, self.ttl).await?;
        }
        Ok(())
    }

    /// Writes counts loaded from the durable store, keeping any field a
    /// concurrent toggle or hydration already wrote.
    pub async fn fill(&self, scope: CounterScope, counts: &[(i64, i64)]) -> Result<(), CacheError> {
        for (shard, entries) in self.group(counts) {
            let key = counter_shard_key(scope, shard);
            self.client
                .hash_set_nx_many(&key, &entries, self.ttl)
                .await?;
        }
        Ok(())
    }

    pub async fn set_absent(&self, scope: CounterScope, id: i64) -> Result<(), CacheError> {
        let key = self.shards.counter_key(scope, id);
        self.client
            .hash_set_many(&key, &[(member(id), ABSENT_MARKER)], self.ttl)
            .await
    }

    /// Swaps an absent marker for a loaded count. Leaves the field alone when
    /// it holds anything else, so a toggle that ran in between is kept.
    pub async fn replace_absent(
        &self,
        scope: CounterScope,
        id: i64,
        count: i64,
    ) -> Result<bool, CacheError> {
        let key = self.shards.counter_key(scope, id);
        self.client
            .hash_replace(&key, &member(id), ABSENT_MARKER, count.max(0), self.ttl)
            .await
    }

    /// Merges every shard of `scope`, skipping absent markers.
    pub async fn scan(&self, scope: CounterScope) -> Result<BTreeMap<i64, i64>, CacheError> {
        let mut merged = BTreeMap::new();
        for key in self.shards.all_counter_keys(scope) {
            for (field, value) in self.client.hash_get_all(&key).await? {
                if value < 0 {
                    continue;
                }
                match field.parse::<i64>() {
                    Ok(id) => {
                        merged.insert(id, value);
                    }
                    Err(_) => warn!(
                        target = "kudos::cache::counters",
                        key = %key,
                        field = %field,
                        "Skipping non-numeric counter field"
                    ),
                }
            }
        }
        Ok(merged)
    }

    fn group(&self, counts: &[(i64, i64)]) -> BTreeMap<usize, Vec<(String, i64)>> {
        let mut by_shard: BTreeMap<usize, Vec<(String, i64)>> = BTreeMap::new();
        for &(id, count) in counts {
            by_shard
                .entry(self.shards.shard(id))
                .or_default()
                .push((member(id), count.max(0)));
        }
        by_shard
    }

    fn partition(&self, ids: &[i64]) -> BTreeMap<usize, Vec<i64>> {
        let mut by_shard: BTreeMap<usize, Vec<i64>> = BTreeMap::new();
        for &id in ids {
            let shard_ids = by_shard.entry(self.shards.shard(id)).or_default();
            if !shard_ids.contains(&id) {
                shard_ids.push(id);
            }
        }
        by_shard
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::cache::store::MemoryKeyspace;
    use crate::domain::types::ActionType;

    const POSTS: CounterScope = CounterScope::Object(ActionType::Post);

    fn cache() -> (Arc<MemoryKeyspace>, CounterCache) {
        let keyspace = Arc::new(MemoryKeyspace::new());
        let shards = ShardResolver::new(NonZeroUsize::new(5).expect("non-zero"));
        let cache = CounterCache::new(keyspace.clone(), shards, Duration::from_secs(60));
        (keyspace, cache)
    }

    #[tokio::test]
    async fn missing_field_is_unknown() {
        let (_, cache) = cache();
        assert_eq!(
            cache.get(POSTS, 1).await.expect("get"),
            CounterLookup::Unknown
        );
    }

    #[tokio::test]
    async fn absent_marker_is_reported_as_known_absent() {
        let (_, cache) = cache();
        cache.set_absent(POSTS, 9).await.expect("mark");
        assert_eq!(
            cache.get(POSTS, 9).await.expect("get"),
            CounterLookup::KnownAbsent
        );
        let many = cache.get_many(POSTS, &[9]).await.expect("get many");
        assert_eq!(many.get(&9), Some(&CounterLookup::KnownAbsent));
    }

    #[tokio::test]
    async fn store_partitions_by_shard_and_reads_back() {
        let (_, cache) = cache();
        let counts: Vec<(i64, i64)> = (1..=20).map(|id| (id, id * 2)).collect();
        cache.store(POSTS, &counts).await.expect("store");

        let ids: Vec<i64> = (1..=21).collect();
        let found = cache.get_many(POSTS, &ids).await.expect("get many");
        assert_eq!(found.len(), 21);
        assert_eq!(found.get(&7), Some(&CounterLookup::Found(14)));
        assert_eq!(found.get(&21), Some(&CounterLookup::Unknown));
    }

    #[tokio::test]
    async fn fill_keeps_existing_counts_but_store_overwrites() {
        let (_, cache) = cache();
        cache.store(POSTS, &[(1, 5)]).await.expect("store");
        cache.fill(POSTS, &[(1, 2), (2, 7)]).await.expect("fill");
        assert_eq!(cache.get(POSTS, 1).await.expect("get"), CounterLookup::Found(5));
        assert_eq!(cache.get(POSTS, 2).await.expect("get"), CounterLookup::Found(7));

        cache.set_absent(POSTS, 3).await.expect("mark");
        cache.store(POSTS, &[(3, 1)]).await.expect("store");
        assert_eq!(cache.get(POSTS, 3).await.expect("get"), CounterLookup::Found(1));
    }

    #[tokio::test]
    async fn replace_absent_keeps_a_count_written_after_the_marker() {
        let (_, cache) = cache();
        cache.set_absent(POSTS, 3).await.expect("mark");
        assert!(cache.replace_absent(POSTS, 3, 0).await.expect("replace"));
        assert_eq!(cache.get(POSTS, 3).await.expect("get"), CounterLookup::Found(0));

        cache.store(POSTS, &[(3, 1)]).await.expect("concurrent toggle");
        assert!(!cache.replace_absent(POSTS, 3, 0).await.expect("late replace"));
        assert_eq!(cache.get(POSTS, 3).await.expect("get"), CounterLookup::Found(1));
    }

    #[tokio::test]
    async fn scan_merges_shards_and_skips_markers() {
        let (keyspace, cache) = cache();
        cache
            .store(POSTS, &[(1, 3), (2, 0), (3, 8)])
            .await
            .expect("store");
        cache.set_absent(POSTS, 4).await.expect("mark");
        keyspace
            .hash_set_many(
                "count:post:0",
                &[("garbage".to_string(), 5)],
                Duration::from_secs(60),
            )
            .await
            .expect("seed garbage");

        let merged = cache.scan(POSTS).await.expect("scan");
        assert_eq!(merged, BTreeMap::from([(1, 3), (2, 0), (3, 8)]));
        assert!(cache.scan(CounterScope::OwnerTotal).await.expect("scan").is_empty());
    }
}
