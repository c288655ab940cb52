//! In-memory stand-ins for the durable store, object resolver and counter
//! columns, wired to the crate's own keyspace and event queue.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Barrier;

use kudos::application::events::{InMemoryEventQueue, batch_count_topic};
use kudos::application::jobs::{BatchFlushTask, apply_batch_count};
use kudos::application::likes::LikeService;
use kudos::application::pagination::PageBounds;
use kudos::application::repos::{
    CounterWriteRepo, LikesRepo, ObjectResolver, RepoError, UpsertLike,
};
use kudos::cache::{CacheConfig, MemoryKeyspace};
use kudos::domain::entities::{LikeActionRecord, RecentLike};
use kudos::domain::likes::BatchCount;
use kudos::domain::types::{ActionType, CounterScope};

#[derive(Default)]
pub struct FakeLikes {
    rows: Mutex<Vec<LikeActionRecord>>,
    fail_upserts: Mutex<bool>,
    fail_target_counts: Mutex<bool>,
    count_gates: Mutex<Vec<Arc<Barrier>>>,
}

impl FakeLikes {
    pub fn seed(&self, actor_id: i64, liking_id: i64, owner_id: i64, at: OffsetDateTime) {
        self.seed_many(actor_id, [liking_id], owner_id, at);
    }

    pub fn seed_many(
        &self,
        actor_id: i64,
        liking_ids: impl IntoIterator<Item = i64>,
        owner_id: i64,
        at: OffsetDateTime,
    ) {
        let mut rows = self.rows.lock().unwrap();
        for liking_id in liking_ids {
            rows.push(LikeActionRecord {
                actor_id,
                liking_id,
                target_owner_id: owner_id,
                action_type: ActionType::Post,
                canceled: false,
                created_at: at,
                updated_at: at,
            });
        }
    }

    pub fn active(&self) -> Vec<LikeActionRecord> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.is_active())
            .cloned()
            .collect()
    }

    pub fn fail_next_upserts(&self) {
        *self.fail_upserts.lock().unwrap() = true;
    }

    pub fn set_target_counts_failing(&self, failing: bool) {
        *self.fail_target_counts.lock().unwrap() = failing;
    }

    /// Holds the next `callers` calls to `count_by_target`, after they read,
    /// until all of them have read.
    pub fn gate_target_counts(&self, callers: usize) {
        let barrier = Arc::new(Barrier::new(callers));
        let mut gates = self.count_gates.lock().unwrap();
        for _ in 0..callers {
            gates.push(barrier.clone());
        }
    }
}

#[async_trait]
impl LikesRepo for FakeLikes {
    async fn count_by_target(
        &self,
        action_type: ActionType,
        liking_id: i64,
    ) -> Result<i64, RepoError> {
        if *self.fail_target_counts.lock().unwrap() {
            return Err(RepoError::Timeout);
        }
        let count = self
            .active()
            .iter()
            .filter(|row| row.action_type == action_type && row.liking_id == liking_id)
            .count() as i64;
        let gate = self.count_gates.lock().unwrap().pop();
        if let Some(barrier) = gate {
            barrier.wait().await;
        }
        Ok(count)
    }

    async fn count_by_targets(
        &self,
        action_type: ActionType,
        liking_ids: &[i64],
    ) -> Result<HashMap<i64, i64>, RepoError> {
        let mut counts = HashMap::new();
        for row in self.active() {
            if row.action_type == action_type && liking_ids.contains(&row.liking_id) {
                *counts.entry(row.liking_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn count_by_owner(&self, owner_id: i64) -> Result<i64, RepoError> {
        Ok(self
            .active()
            .iter()
            .filter(|row| row.target_owner_id == owner_id)
            .count() as i64)
    }

    async fn count_by_actor(
        &self,
        actor_id: i64,
        action_type: ActionType,
    ) -> Result<i64, RepoError> {
        Ok(self
            .active()
            .iter()
            .filter(|row| row.actor_id == actor_id && row.action_type == action_type)
            .count() as i64)
    }

    async fn recent_by_actor(
        &self,
        actor_id: i64,
        action_type: ActionType,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<RecentLike>, RepoError> {
        let mut rows: Vec<_> = self
            .active()
            .into_iter()
            .filter(|row| row.actor_id == actor_id && row.action_type == action_type)
            .collect();
        rows.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.liking_id.cmp(&a.liking_id))
        });
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|row| RecentLike {
                liking_id: row.liking_id,
                updated_at: row.updated_at,
            })
            .collect())
    }

    async fn find_like(
        &self,
        actor_id: i64,
        liking_id: i64,
        action_type: ActionType,
    ) -> Result<Option<LikeActionRecord>, RepoError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| {
                row.actor_id == actor_id
                    && row.liking_id == liking_id
                    && row.action_type == action_type
            })
            .cloned())
    }

    async fn upsert_like(&self, like: UpsertLike) -> Result<LikeActionRecord, RepoError> {
        if *self.fail_upserts.lock().unwrap() {
            return Err(RepoError::Timeout);
        }
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|row| {
            row.actor_id == like.actor_id
                && row.liking_id == like.liking_id
                && row.action_type == like.action_type
        }) {
            row.canceled = like.canceled;
            row.target_owner_id = like.target_owner_id;
            row.updated_at = like.at;
            return Ok(row.clone());
        }
        let record = LikeActionRecord {
            actor_id: like.actor_id,
            liking_id: like.liking_id,
            target_owner_id: like.target_owner_id,
            action_type: like.action_type,
            canceled: like.canceled,
            created_at: like.at,
            updated_at: like.at,
        };
        rows.push(record.clone());
        Ok(record)
    }
}

#[derive(Default)]
pub struct FakeObjects {
    owners: Mutex<HashMap<(ActionType, i64), i64>>,
}

impl FakeObjects {
    pub fn add(&self, action_type: ActionType, id: i64, owner_id: i64) {
        self.owners
            .lock()
            .unwrap()
            .insert((action_type, id), owner_id);
    }
}

#[async_trait]
impl ObjectResolver for FakeObjects {
    async fn resolve_owner(
        &self,
        action_type: ActionType,
        object_id: i64,
    ) -> Result<Option<i64>, RepoError> {
        Ok(self
            .owners
            .lock()
            .unwrap()
            .get(&(action_type, object_id))
            .copied())
    }
}

#[derive(Default)]
pub struct FakeColumns {
    values: Mutex<HashMap<(CounterScope, i64), i64>>,
}

impl FakeColumns {
    pub fn get(&self, scope: CounterScope, id: i64) -> Option<i64> {
        self.values.lock().unwrap().get(&(scope, id)).copied()
    }
}

#[async_trait]
impl CounterWriteRepo for FakeColumns {
    async fn apply_counts(
        &self,
        scope: CounterScope,
        counts: &BTreeMap<i64, i64>,
    ) -> Result<u64, RepoError> {
        let mut values = self.values.lock().unwrap();
        for (id, count) in counts {
            values.insert((scope, *id), *count);
        }
        Ok(counts.len() as u64)
    }
}

pub struct Harness {
    pub likes: Arc<FakeLikes>,
    pub objects: Arc<FakeObjects>,
    pub columns: Arc<FakeColumns>,
    pub queue: Arc<InMemoryEventQueue>,
    pub service: LikeService,
}

pub const U1: i64 = 1;
pub const U2: i64 = 2;
pub const P1: i64 = 101;
pub const POSTS: CounterScope = CounterScope::Object(ActionType::Post);

pub fn harness() -> Harness {
    let likes = Arc::new(FakeLikes::default());
    let objects = Arc::new(FakeObjects::default());
    let columns = Arc::new(FakeColumns::default());
    let queue = Arc::new(InMemoryEventQueue::new());
    let service = LikeService::new(
        likes.clone(),
        objects.clone(),
        queue.clone(),
        Arc::new(MemoryKeyspace::new()),
        &CacheConfig::default(),
        PageBounds::new(1, 50),
    );
    objects.add(ActionType::Post, P1, U2);
    objects.add(ActionType::User, U1, U1);
    objects.add(ActionType::User, U2, U2);
    Harness {
        likes,
        objects,
        columns,
        queue,
        service,
    }
}

/// Runs one flush cycle and feeds every batch to the counter columns.
pub async fn flush_and_consume(h: &Harness) {
    let task = BatchFlushTask::new(h.service.counters().clone(), h.queue.clone());
    let report = task.run_once().await;
    assert!(report.is_clean(), "flush failed: {report:?}");

    for scope in CounterScope::ALL {
        for event in h.queue.drain_topic(&batch_count_topic(scope)) {
            let batch: BatchCount = serde_json::from_value(event.payload).expect("batch payload");
            apply_batch_count(h.columns.as_ref(), &batch)
                .await
                .expect("apply batch");
        }
    }
}
