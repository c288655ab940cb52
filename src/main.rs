use std::{process, sync::Arc};

use kudos::{
    application::{
        error::AppError,
        events::{EventPublisher, LIKE_REQUEST_TOPIC},
        jobs::{
            BatchFlushTask, ConsumerContext, FlushContext, IntakeContext, JobMonitor,
            MonitorOptions,
        },
        likes::LikeService,
        repos::{CounterWriteRepo, LikesRepo, ObjectResolver},
    },
    cache::{CacheClient, CacheConfig, MemoryKeyspace},
    config,
    infra::{db::PostgresRepositories, error::InfraError, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to load configuration: {err}"
        )))
    })?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let database_url = database_url(&settings)?;
    let pool = PostgresRepositories::connect(database_url, 1)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    PostgresRepositories::setup_queue(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    info!(target = "kudos::migrate", "Migrations applied");
    Ok(())
}

/// Hosts the like engine. The process owns the cache keyspace: queued like
/// commands are applied against it and the flush cron publishes from it.
async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (repositories, job_repositories) = init_repositories(&settings).await?;

    let likes_repo: Arc<dyn LikesRepo> = repositories.clone();
    let resolver: Arc<dyn ObjectResolver> = repositories.clone();
    let publisher: Arc<dyn EventPublisher> = repositories.clone();
    let counter_writes: Arc<dyn CounterWriteRepo> = job_repositories.clone();
    let keyspace: Arc<dyn CacheClient> = Arc::new(MemoryKeyspace::new());

    let cache_config = CacheConfig::from(&settings.cache);
    let likes = LikeService::new(
        likes_repo,
        resolver,
        publisher.clone(),
        keyspace,
        &cache_config,
        settings.likes.page_bounds(),
    );

    let flush = FlushContext {
        task: Arc::new(BatchFlushTask::new(likes.counters().clone(), publisher)),
    };
    let intake = IntakeContext { likes };
    let consumers = ConsumerContext {
        counters: counter_writes,
    };
    let options = MonitorOptions {
        flush_schedule: settings.jobs.flush_schedule.clone(),
        consumer_concurrency: settings.jobs.consumer_concurrency.get() as usize,
        intake_concurrency: settings.jobs.intake_concurrency.get() as usize,
    };
    let monitor = JobMonitor::start(
        job_repositories.pool().clone(),
        intake,
        flush,
        consumers,
        options,
    );

    info!(
        target = "kudos::serve",
        shards = cache_config.shard_count,
        hydrate_limit = cache_config.hydrate_limit,
        intake = LIKE_REQUEST_TOPIC,
        "Like engine ready; press Ctrl-C to stop"
    );

    let result = tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::from(InfraError::Io(err)));

    info!(target = "kudos::serve", "Shutting down");
    monitor.stop().await;

    result
}

fn database_url(settings: &config::Settings) -> Result<&str, AppError> {
    settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| AppError::from(InfraError::configuration("database url is not configured")))
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<(Arc<PostgresRepositories>, Arc<PostgresRepositories>), AppError> {
    let database_url = database_url(settings)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    PostgresRepositories::setup_queue(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let jobs_pool =
        PostgresRepositories::connect(database_url, settings.database.jobs_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok((
        Arc::new(PostgresRepositories::new(pool)),
        Arc::new(PostgresRepositories::new(jobs_pool)),
    ))
}
