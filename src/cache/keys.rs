//! Cache key layout and the shard resolver.
//!
//! Counter shards live at `count:<scope>:<shard>`; user-action sets at
//! `useractions:<actor>:<action_type>`.

use std::num::NonZeroUsize;

use crate::domain::types::{ActionType, CounterScope};

/// Maps object ids onto a fixed number of counter shards.
///
/// CRC32 over the little-endian id bytes keeps the mapping stable across
/// processes and restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardResolver {
    shards: NonZeroUsize,
}

impl ShardResolver {
    pub fn new(shards: NonZeroUsize) -> Self {
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.get()
    }

    pub fn shard(&self, id: i64) -> usize {
        let hash = crc32fast::hash(&id.to_le_bytes());
        hash as usize % self.shards.get()
    }

    /// Key of the shard holding `id` within `scope`.
    pub fn counter_key(&self, scope: CounterScope, id: i64) -> String {
        counter_shard_key(scope, self.shard(id))
    }

    /// Every shard key of `scope`, in shard order.
    pub fn all_counter_keys(&self, scope: CounterScope) -> Vec<String> {
        (0..self.shards.get())
            .map(|shard| counter_shard_key(scope, shard))
            .collect()
    }
}

pub fn counter_shard_key(scope: CounterScope, shard: usize) -> String {
    format!("count:{}:{shard}", scope.as_str())
}

pub fn user_actions_key(actor_id: i64, action_type: ActionType) -> String {
    format!("useractions:{actor_id}:{}", action_type.as_str())
}

/// Hash field / sorted-set member encoding of an object id.
pub fn member(id: i64) -> String {
    id.to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn resolver(shards: usize) -> ShardResolver {
        ShardResolver::new(NonZeroUsize::new(shards).expect("non-zero"))
    }

    #[test]
    fn shard_is_stable_and_in_range() {
        let resolver = resolver(5);
        for id in [1_i64, 2, 42, 9_999_999, i64::MAX] {
            let shard = resolver.shard(id);
            assert!(shard < 5);
            assert_eq!(shard, resolver.shard(id));
        }
    }

    #[test]
    fn shard_matches_crc32_of_le_bytes() {
        let resolver = resolver(5);
        let expected = crc32fast::hash(&42_i64.to_le_bytes()) as usize % 5;
        assert_eq!(resolver.shard(42), expected);
    }

    #[test]
    fn ids_spread_across_shards() {
        let resolver = resolver(5);
        let used: HashSet<usize> = (1..=200).map(|id| resolver.shard(id)).collect();
        assert_eq!(used.len(), 5);
    }

    #[test]
    fn key_shapes() {
        let resolver = resolver(5);
        let shard = resolver.shard(7);
        assert_eq!(
            resolver.counter_key(CounterScope::Object(ActionType::Post), 7),
            format!("count:post:{shard}")
        );
        assert_eq!(user_actions_key(3, ActionType::Comment), "useractions:3:comment");
        assert_eq!(
            resolver.all_counter_keys(CounterScope::OwnerTotal),
            vec![
                "count:owner_total:0",
                "count:owner_total:1",
                "count:owner_total:2",
                "count:owner_total:3",
                "count:owner_total:4",
            ]
        );
    }
}
