//! Cache keyspace.
//!
//! [`CacheClient`] is the boundary the like engine talks to: hashes of integer
//! counters, sorted sets with integer scores, per-key TTL and one atomic
//! multi-key [`toggle`](CacheClient::toggle). [`MemoryKeyspace`] is the
//! in-process implementation.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use super::error::CacheError;
use super::lock::{mutex_lock, rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// Minimum spacing between two sweeps of expired keys.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// One counter field touched by a toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterField {
    pub key: String,
    pub field: String,
}

/// Arguments of the atomic like/unlike step.
///
/// The toggle only runs against a hydrated set: when `set_key` is missing or
/// lacks `hydrated_member`, nothing is mutated and [`ToggleOutcome::Cold`] is
/// returned.
#[derive(Debug, Clone)]
pub struct ToggleScript {
    pub set_key: String,
    pub hydrated_member: String,
    pub member: String,
    /// Score stored for `member` when it is added.
    pub score: i64,
    pub cancel: bool,
    /// Added to every counter in `counters`; the result is floored at zero.
    pub delta: i64,
    pub counters: Vec<CounterField>,
    /// Applied to counter keys that have no TTL yet.
    pub counter_ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Applied,
    Noop,
    Cold,
}

#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<i64>, CacheError>;

    /// Values in the order of `fields`.
    async fn hash_get_many(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<i64>>, CacheError>;

    /// Writes every entry, then sets `ttl` if the key has none.
    async fn hash_set_many(
        &self,
        key: &str,
        entries: &[(String, i64)],
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Writes only the entries whose field is missing, then sets `ttl` if the
    /// key has none. Returns the number of fields written.
    async fn hash_set_nx_many(
        &self,
        key: &str,
        entries: &[(String, i64)],
        ttl: Duration,
    ) -> Result<usize, CacheError>;

    /// Sets `field` to `value` only while it currently holds `expected`, then
    /// sets `ttl` if the key has none. Returns whether the field was replaced.
    async fn hash_replace(
        &self,
        key: &str,
        field: &str,
        expected: i64,
        value: i64,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, i64)>, CacheError>;

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, CacheError>;

    /// Adds members not already present, then sets `ttl` if the key has none.
    /// Adds nothing and returns `None` when `guard` is already a member;
    /// otherwise returns the number of members added.
    async fn zadd_nx_unless(
        &self,
        key: &str,
        guard: &str,
        members: &[(String, i64)],
        ttl: Duration,
    ) -> Result<Option<usize>, CacheError>;

    /// Members with score `>= min_score`, highest score first, after skipping
    /// `offset` and taking at most `count`. Equal scores order by member descending.
    async fn zrevrange_by_score(
        &self,
        key: &str,
        min_score: i64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, CacheError>;

    async fn zcard(&self, key: &str) -> Result<usize, CacheError>;

    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    async fn toggle(&self, script: &ToggleScript) -> Result<ToggleOutcome, CacheError>;
}

#[derive(Debug)]
enum Value {
    Hash(HashMap<String, i64>),
    SortedSet(HashMap<String, i64>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Hash(_) => "hash",
            Value::SortedSet(_) => "sorted set",
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }

    fn expire_if_unset(&mut self, ttl: Duration, now: Instant) {
        if self.expires_at.is_none() {
            self.expires_at = Some(now + ttl);
        }
    }
}

/// In-process keyspace. Every operation takes the map lock once, so each call,
/// including [`toggle`](CacheClient::toggle), is atomic with respect to the others.
///
/// Expired keys are treated as missing. They are dropped on the next write that
/// touches them, and writes sweep the whole map at most once per [`SWEEP_INTERVAL`].
#[derive(Debug, Default)]
pub struct MemoryKeyspace {
    entries: RwLock<HashMap<String, Entry>>,
    last_sweep: Mutex<Option<Instant>>,
}

impl MemoryKeyspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let guard = rw_read(&self.entries, SOURCE, "len");
        guard.values().filter(|entry| !entry.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining lifetime of `key`, `None` when missing or without TTL.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let guard = rw_read(&self.entries, SOURCE, "ttl");
        let entry = guard.get(key).filter(|entry| !entry.is_expired(now))?;
        entry
            .expires_at
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Keys held in memory, expired or not.
    #[cfg(test)]
    fn stored_len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "stored_len").len()
    }

    #[cfg(test)]
    async fn zadd_nx(
        &self,
        key: &str,
        members: &[(String, i64)],
        ttl: Duration,
    ) -> Result<usize, CacheError> {
        let now = Instant::now();
        let mut guard = self.write("zadd_nx", now);
        let entry = Self::set_mut(&mut guard, key, now)?;
        Ok(add_members(entry, members, ttl, now))
    }

    /// Write guard over the map, sweeping expired keys first when a sweep is due.
    fn write(&self, op: &'static str, now: Instant) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        let mut guard = rw_write(&self.entries, SOURCE, op);
        let due = {
            let mut last = mutex_lock(&self.last_sweep, SOURCE, op);
            let due = (*last).is_none_or(|at| now.saturating_duration_since(at) >= SWEEP_INTERVAL);
            if due {
                *last = Some(now);
            }
            due
        };
        if due {
            Self::sweep(&mut guard, now);
        }
        guard
    }

    fn sweep(entries: &mut HashMap<String, Entry>, now: Instant) {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(
                target = "kudos::cache::store",
                removed,
                remaining = entries.len(),
                "Swept expired keys"
            );
        }
    }

    fn read_hash<'a>(
        entries: &'a HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Result<Option<&'a HashMap<String, i64>>, CacheError> {
        match entries.get(key).filter(|entry| !entry.is_expired(now)) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(Some(hash)),
            Some(entry) => Err(wrong_type(key, "hash", entry.value.kind())),
        }
    }

    fn read_set<'a>(
        entries: &'a HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Result<Option<&'a HashMap<String, i64>>, CacheError> {
        match entries.get(key).filter(|entry| !entry.is_expired(now)) {
            None => Ok(None),
            Some(Entry {
                value: Value::SortedSet(set),
                ..
            }) => Ok(Some(set)),
            Some(entry) => Err(wrong_type(key, "sorted set", entry.value.kind())),
        }
    }

    /// Live entry for `key`, created empty when missing or expired.
    fn entry_mut<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
        empty: fn() -> Value,
    ) -> &'a mut Entry {
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: empty(),
            expires_at: None,
        })
    }

    fn hash_mut<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Result<&'a mut Entry, CacheError> {
        let entry = Self::entry_mut(entries, key, now, || Value::Hash(HashMap::new()));
        if matches!(entry.value, Value::Hash(_)) {
            Ok(entry)
        } else {
            Err(wrong_type(key, "hash", entry.value.kind()))
        }
    }

    fn set_mut<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Result<&'a mut Entry, CacheError> {
        let entry = Self::entry_mut(entries, key, now, || Value::SortedSet(HashMap::new()));
        if matches!(entry.value, Value::SortedSet(_)) {
            Ok(entry)
        } else {
            Err(wrong_type(key, "sorted set", entry.value.kind()))
        }
    }
}

fn wrong_type(key: &str, expected: &'static str, found: &'static str) -> CacheError {
    CacheError::WrongType {
        key: key.to_string(),
        expected,
        found,
    }
}

/// Moves a counter by `delta`. Negative stored values (markers) count as zero
/// and the result never drops below zero.
fn apply_delta(current: Option<i64>, delta: i64) -> i64 {
    let base = current.unwrap_or(0).max(0);
    base.saturating_add(delta).max(0)
}

/// Inserts the members a sorted set does not hold yet. Returns how many were added.
fn add_members(entry: &mut Entry, members: &[(String, i64)], ttl: Duration, now: Instant) -> usize {
    let mut added = 0;
    if let Value::SortedSet(set) = &mut entry.value {
        for (member, score) in members {
            if !set.contains_key(member) {
                set.insert(member.clone(), *score);
                added += 1;
            }
        }
    }
    entry.expire_if_unset(ttl, now);
    added
}

#[async_trait]
impl CacheClient for MemoryKeyspace {
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<i64>, CacheError> {
        let now = Instant::now();
        let guard = rw_read(&self.entries, SOURCE, "hash_get");
        let hash = Self::read_hash(&guard, key, now)?;
        Ok(hash.and_then(|hash| hash.get(field).copied()))
    }

    async fn hash_get_many(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<i64>>, CacheError> {
        let now = Instant::now();
        let guard = rw_read(&self.entries, SOURCE, "hash_get_many");
        let hash = Self::read_hash(&guard, key, now)?;
        Ok(fields
            .iter()
            .map(|field| hash.and_then(|hash| hash.get(field).copied()))
            .collect())
    }

    async fn hash_set_many(
        &self,
        key: &str,
        entries: &[(String, i64)],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }
        let now = Instant::now();
        let mut guard = self.write("hash_set_many", now);
        let entry = Self::hash_mut(&mut guard, key, now)?;
        if let Value::Hash(hash) = &mut entry.value {
            for (field, value) in entries {
                hash.insert(field.clone(), *value);
            }
        }
        entry.expire_if_unset(ttl, now);
        Ok(())
    }

    async fn hash_set_nx_many(
        &self,
        key: &str,
        entries: &[(String, i64)],
        ttl: Duration,
    ) -> Result<usize, CacheError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let now = Instant::now();
        let mut guard = self.write("hash_set_nx_many", now);
        let entry = Self::hash_mut(&mut guard, key, now)?;
        let mut written = 0;
        if let Value::Hash(hash) = &mut entry.value {
            for (field, value) in entries {
                if !hash.contains_key(field) {
                    hash.insert(field.clone(), *value);
                    written += 1;
                }
            }
        }
        entry.expire_if_unset(ttl, now);
        Ok(written)
    }

    async fn hash_replace(
        &self,
        key: &str,
        field: &str,
        expected: i64,
        value: i64,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut guard = self.write("hash_replace", now);
        let current = Self::read_hash(&guard, key, now)?.and_then(|hash| hash.get(field).copied());
        if current != Some(expected) {
            return Ok(false);
        }
        let entry = Self::hash_mut(&mut guard, key, now)?;
        if let Value::Hash(hash) = &mut entry.value {
            hash.insert(field.to_string(), value);
        }
        entry.expire_if_unset(ttl, now);
        Ok(true)
    }

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, i64)>, CacheError> {
        let now = Instant::now();
        let guard = rw_read(&self.entries, SOURCE, "hash_get_all");
        let hash = Self::read_hash(&guard, key, now)?;
        Ok(hash
            .map(|hash| {
                hash.iter()
                    .map(|(field, value)| (field.clone(), *value))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, CacheError> {
        let now = Instant::now();
        let guard = rw_read(&self.entries, SOURCE, "zscore");
        let set = Self::read_set(&guard, key, now)?;
        Ok(set.and_then(|set| set.get(member).copied()))
    }

    async fn zadd_nx_unless(
        &self,
        key: &str,
        guard: &str,
        members: &[(String, i64)],
        ttl: Duration,
    ) -> Result<Option<usize>, CacheError> {
        let now = Instant::now();
        let mut entries = self.write("zadd_nx_unless", now);
        if Self::read_set(&entries, key, now)?.is_some_and(|set| set.contains_key(guard)) {
            return Ok(None);
        }
        let entry = Self::set_mut(&mut entries, key, now)?;
        Ok(Some(add_members(entry, members, ttl, now)))
    }

    async fn zrevrange_by_score(
        &self,
        key: &str,
        min_score: i64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let guard = rw_read(&self.entries, SOURCE, "zrevrange_by_score");
        let Some(set) = Self::read_set(&guard, key, now)? else {
            return Ok(Vec::new());
        };
        let mut ranked: Vec<(&String, i64)> = set
            .iter()
            .filter(|(_, score)| **score >= min_score)
            .map(|(member, score)| (member, *score))
            .collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(a.0)));
        Ok(ranked
            .into_iter()
            .skip(offset)
            .take(count)
            .map(|(member, _)| member.clone())
            .collect())
    }

    async fn zcard(&self, key: &str) -> Result<usize, CacheError> {
        let now = Instant::now();
        let guard = rw_read(&self.entries, SOURCE, "zcard");
        Ok(Self::read_set(&guard, key, now)?.map_or(0, HashMap::len))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut guard = self.write("delete", now);
        Ok(guard
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn toggle(&self, script: &ToggleScript) -> Result<ToggleOutcome, CacheError> {
        let now = Instant::now();
        let mut guard = self.write("toggle", now);

        let present = {
            let Some(set) = Self::read_set(&guard, &script.set_key, now)? else {
                return Ok(ToggleOutcome::Cold);
            };
            if !set.contains_key(&script.hydrated_member) {
                return Ok(ToggleOutcome::Cold);
            }
            set.contains_key(&script.member)
        };

        if present != script.cancel {
            return Ok(ToggleOutcome::Noop);
        }

        // Type-check every counter key before the first mutation.
        for counter in &script.counters {
            Self::read_hash(&guard, &counter.key, now)?;
        }

        let entry = Self::set_mut(&mut guard, &script.set_key, now)?;
        if let Value::SortedSet(set) = &mut entry.value {
            if script.cancel {
                set.remove(&script.member);
            } else {
                set.insert(script.member.clone(), script.score);
            }
        }

        for counter in &script.counters {
            let entry = Self::hash_mut(&mut guard, &counter.key, now)?;
            if let Value::Hash(hash) = &mut entry.value {
                let next = apply_delta(hash.get(&counter.field).copied(), script.delta);
                hash.insert(counter.field.clone(), next);
            }
            entry.expire_if_unset(script.counter_ttl, now);
        }

        Ok(ToggleOutcome::Applied)
    }
}
