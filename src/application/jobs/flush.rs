//! Periodic flush of cached like counts.
//!
//! Every tick merges all shards of each counter scope and publishes one
//! [`BatchCount`] per non-empty scope. Failures stay inside the task and the
//! next tick retries with fresh counts.

use std::sync::Arc;
use std::time::Instant;

use apalis::prelude::{Data, Error as ApalisError};
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{info, warn};

use crate::application::events::{EventPublisher, PublishError, batch_count_topic, publish_json};
use crate::cache::{CacheError, CounterCache};
use crate::domain::likes::BatchCount;
use crate::domain::types::CounterScope;

use super::context::FlushContext;

const METRIC_FLUSH_PUBLISHED: &str = "kudos_flush_published_total";
const METRIC_FLUSH_FAILED: &str = "kudos_flush_failed_total";
const METRIC_FLUSH_MS: &str = "kudos_flush_ms";

/// Tick of the flush cron. Must implement `From<chrono::DateTime<chrono::Utc>>`
/// for apalis-cron.
#[derive(Default, Debug, Clone)]
pub struct FlushLikeCountsJob;

impl From<chrono::DateTime<chrono::Utc>> for FlushLikeCountsJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Debug, Error)]
enum FlushError {
    #[error("failed to scan counter shards")]
    Scan(#[from] CacheError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Outcome of one flush cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// Scopes published, with the number of counts each carried.
    pub published: Vec<(CounterScope, usize)>,
    pub skipped: Vec<CounterScope>,
    pub failed: Vec<CounterScope>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct BatchFlushTask {
    counters: CounterCache,
    publisher: Arc<dyn EventPublisher>,
}

impl BatchFlushTask {
    pub fn new(counters: CounterCache, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            counters,
            publisher,
        }
    }

    pub async fn run_once(&self) -> FlushReport {
        let started_at = Instant::now();
        let mut report = FlushReport::default();

        for scope in CounterScope::ALL {
            match self.flush_scope(scope).await {
                Ok(0) => report.skipped.push(scope),
                Ok(len) => {
                    counter!(METRIC_FLUSH_PUBLISHED, "scope" => scope.as_str()).increment(1);
                    report.published.push((scope, len));
                }
                Err(err) => {
                    counter!(METRIC_FLUSH_FAILED, "scope" => scope.as_str()).increment(1);
                    warn!(
                        target = "kudos::application::jobs::flush",
                        scope = %scope,
                        error = %err,
                        "Batch count flush failed; retrying next tick"
                    );
                    report.failed.push(scope);
                }
            }
        }

        histogram!(METRIC_FLUSH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        report
    }

    /// Publishes the merged counts of `scope`; returns how many were sent.
    async fn flush_scope(&self, scope: CounterScope) -> Result<usize, FlushError> {
        let counts = self.counters.scan(scope).await?;
        if counts.is_empty() {
            return Ok(0);
        }
        let batch = BatchCount { scope, counts };
        publish_json(
            self.publisher.as_ref(),
            &batch_count_topic(scope),
            &batch,
        )
        .await?;
        Ok(batch.len())
    }
}

/// Cron entry point. Flush failures are reported through logs and metrics only.
pub async fn process_flush_job(
    _job: FlushLikeCountsJob,
    ctx: Data<FlushContext>,
) -> Result<(), ApalisError> {
    let report = ctx.task.run_once().await;
    info!(
        target = "kudos::application::jobs::flush",
        published = report.published.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Batch count flush finished"
    );
    Ok(())
}
