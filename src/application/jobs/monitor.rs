//! Lifecycle of the background workers.

use std::time::Duration;

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_cron::{CronStream, Schedule};
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use sqlx::PgPool;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::events::{LIKE_REQUEST_TOPIC, batch_count_topic};
use crate::domain::likes::{BatchCount, LikeCommand};
use crate::domain::types::CounterScope;

use super::consumers::process_batch_count_job;
use super::context::{ConsumerContext, FlushContext, IntakeContext};
use super::flush::process_flush_job;
use super::intake::process_like_command_job;

const STOP_GRACE: Duration = Duration::from_secs(10);

/// Worker settings needed to start the monitor.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub flush_schedule: Schedule,
    pub consumer_concurrency: usize,
    pub intake_concurrency: usize,
}

/// Runs the like-command intake, the flush cron and one batch-count consumer
/// per counter scope until [`stop`](JobMonitor::stop) is called.
///
/// The intake and the flush share one [`LikeService`](crate::application::likes::LikeService)
/// and so one cache keyspace: whatever the intake applies is what the next
/// flush publishes.
pub struct JobMonitor {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl JobMonitor {
    pub fn start(
        pool: PgPool,
        intake: IntakeContext,
        flush: FlushContext,
        consumers: ConsumerContext,
        options: MonitorOptions,
    ) -> Self {
        let intake_storage: PostgresStorage<LikeCommand> = PostgresStorage::new_with_config(
            pool.clone(),
            ApalisSqlConfig::new(LIKE_REQUEST_TOPIC),
        );
        let intake_worker = WorkerBuilder::new("like-request-worker")
            .concurrency(options.intake_concurrency.max(1))
            .data(intake)
            .backend(intake_storage)
            .build_fn(process_like_command_job);

        let flush_worker = WorkerBuilder::new("flush-like-counts-worker")
            .data(flush)
            .backend(CronStream::new(options.flush_schedule))
            .build_fn(process_flush_job);

        let mut monitor = Monitor::new()
            .register(intake_worker)
            .register(flush_worker);
        for scope in CounterScope::ALL {
            let topic = batch_count_topic(scope);
            let storage: PostgresStorage<BatchCount> =
                PostgresStorage::new_with_config(pool.clone(), ApalisSqlConfig::new(&topic));
            let worker = WorkerBuilder::new(format!("batch-count-{}-worker", scope.as_str()))
                .concurrency(options.consumer_concurrency.max(1))
                .data(consumers.clone())
                .backend(storage)
                .build_fn(process_batch_count_job);
            monitor = monitor.register(worker);
        }

        let (shutdown, signal) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let stopped = async move {
                let _ = signal.await;
                Ok(())
            };
            if let Err(err) = monitor.run_with_signal(stopped).await {
                error!(
                    target = "kudos::application::jobs::monitor",
                    error = %err,
                    "job monitor stopped"
                );
            }
        });
        info!(
            target = "kudos::application::jobs::monitor",
            consumers = CounterScope::ALL.len(),
            "Job monitor started"
        );

        Self {
            shutdown: Some(shutdown),
            handle,
        }
    }

    /// Signals every worker to stop and waits for them, aborting after a grace period.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let abort = self.handle.abort_handle();
        match tokio::time::timeout(STOP_GRACE, &mut self.handle).await {
            Ok(_) => info!(
                target = "kudos::application::jobs::monitor",
                "Job monitor stopped"
            ),
            Err(_) => {
                warn!(
                    target = "kudos::application::jobs::monitor",
                    grace_secs = STOP_GRACE.as_secs(),
                    "Job monitor did not stop in time; aborting"
                );
                abort.abort();
            }
        }
    }
}
