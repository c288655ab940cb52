//! Batch-count consumers: absolute counter assignment in the durable store.

use apalis::prelude::{Data, Error as ApalisError};
use metrics::counter;
use tracing::{debug, info};

use crate::application::repos::{CounterWriteRepo, RepoError};
use crate::domain::likes::BatchCount;

use super::context::{ConsumerContext, job_failed};

const METRIC_BATCH_APPLIED: &str = "kudos_batch_count_applied_total";

/// Writes every count of `batch` as-is. Applying the same batch twice leaves
/// the same values behind.
pub async fn apply_batch_count(
    repo: &dyn CounterWriteRepo,
    batch: &BatchCount,
) -> Result<u64, RepoError> {
    if batch.is_empty() {
        return Ok(0);
    }
    let updated = repo.apply_counts(batch.scope, &batch.counts).await?;
    counter!(METRIC_BATCH_APPLIED, "scope" => batch.scope.as_str()).increment(updated);
    if updated < batch.len() as u64 {
        debug!(
            target = "kudos::application::jobs::consumers",
            scope = %batch.scope,
            received = batch.len(),
            updated,
            "Some counted objects no longer exist"
        );
    }
    Ok(updated)
}

pub async fn process_batch_count_job(
    batch: BatchCount,
    ctx: Data<ConsumerContext>,
) -> Result<(), ApalisError> {
    let updated = apply_batch_count(ctx.counters.as_ref(), &batch)
        .await
        .map_err(job_failed)?;
    info!(
        target = "kudos::application::jobs::consumers",
        scope = %batch.scope,
        received = batch.len(),
        updated,
        "Applied batch counts"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::types::{ActionType, CounterScope};

    #[derive(Default)]
    struct ColumnStub {
        rows: Mutex<BTreeMap<(CounterScope, i64), i64>>,
    }

    #[async_trait]
    impl CounterWriteRepo for ColumnStub {
        async fn apply_counts(
            &self,
            scope: CounterScope,
            counts: &BTreeMap<i64, i64>,
        ) -> Result<u64, RepoError> {
            let mut rows = self.rows.lock().expect("rows lock");
            let mut updated = 0;
            for (id, count) in counts {
                if let Some(value) = rows.get_mut(&(scope, *id)) {
                    *value = *count;
                    updated += 1;
                }
            }
            Ok(updated)
        }
    }

    #[tokio::test]
    async fn apply_is_idempotent_and_skips_missing_rows() {
        let posts = CounterScope::Object(ActionType::Post);
        let stub = ColumnStub::default();
        stub.rows.lock().expect("rows lock").extend([((posts, 1), 0), ((posts, 2), 9)]);

        let batch = BatchCount::new(posts, [(1, 3), (2, 4), (99, 1)]);
        assert_eq!(apply_batch_count(&stub, &batch).await.expect("apply"), 2);
        assert_eq!(apply_batch_count(&stub, &batch).await.expect("reapply"), 2);

        let rows = stub.rows.lock().expect("rows lock");
        assert_eq!(rows.get(&(posts, 1)), Some(&3));
        assert_eq!(rows.get(&(posts, 2)), Some(&4));
        assert!(!rows.contains_key(&(posts, 99)));
    }

    #[tokio::test]
    async fn empty_batch_touches_nothing() {
        let stub = ColumnStub::default();
        let batch = BatchCount::new(CounterScope::OwnerTotal, []);
        assert_eq!(apply_batch_count(&stub, &batch).await.expect("apply"), 0);
    }
}
