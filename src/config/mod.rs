//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use apalis_cron::Schedule;
use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::pagination::PageBounds;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "kudos";
const ENV_PREFIX: &str = "KUDOS";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_JOBS_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_CACHE_SHARD_COUNT: u64 = 5;
const DEFAULT_CACHE_COUNTER_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_CACHE_USER_ACTIONS_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_CACHE_HYDRATE_LIMIT: u64 = 600;
const DEFAULT_LIKES_MIN_PAGE_SIZE: u64 = 1;
const DEFAULT_LIKES_MAX_PAGE_SIZE: u64 = 50;
const DEFAULT_FLUSH_SCHEDULE: &str = "0 0 */4 * * *";
const DEFAULT_CONSUMER_CONCURRENCY: u64 = 1;
const DEFAULT_INTAKE_CONCURRENCY: u64 = 4;

/// Command-line arguments for the kudos binary.
#[derive(Debug, Parser)]
#[command(name = "kudos", version, about = "Cache-first like counters backed by Postgres")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "KUDOS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the flush cron and the batch-count consumers.
    Serve(Box<ServeArgs>),
    /// Apply database migrations and exit.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the service database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the jobs database pool size.
    #[arg(long = "database-jobs-max-connections", value_name = "COUNT")]
    pub database_jobs_max_connections: Option<u32>,

    /// Override the number of counter shards per scope.
    #[arg(long = "cache-shard-count", value_name = "COUNT")]
    pub cache_shard_count: Option<u64>,

    /// Override how many recent likes hydrate a user-action set.
    #[arg(long = "cache-hydrate-limit", value_name = "COUNT")]
    pub cache_hydrate_limit: Option<u64>,

    /// Override the flush cron expression (seconds field first).
    #[arg(long = "jobs-flush-schedule", value_name = "CRON")]
    pub jobs_flush_schedule: Option<String>,

    /// Override the batch-count consumer concurrency.
    #[arg(long = "jobs-consumer-concurrency", value_name = "COUNT")]
    pub jobs_consumer_concurrency: Option<u64>,

    /// Override how many queued like commands are applied at once.
    #[arg(long = "jobs-intake-concurrency", value_name = "COUNT")]
    pub jobs_intake_concurrency: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub likes: LikesSettings,
    pub jobs: JobsSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub jobs_max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub shard_count: NonZeroUsize,
    pub counter_ttl: Duration,
    pub user_actions_ttl: Duration,
    pub hydrate_limit: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct LikesSettings {
    pub min_page_size: NonZeroU32,
    pub max_page_size: NonZeroU32,
}

impl LikesSettings {
    pub fn page_bounds(&self) -> PageBounds {
        PageBounds::new(self.min_page_size.get(), self.max_page_size.get())
    }
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub flush_schedule: Schedule,
    pub consumer_concurrency: NonZeroU32,
    pub intake_concurrency: NonZeroU32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    likes: RawLikesSettings,
    jobs: RawJobsSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(max) = overrides.database_jobs_max_connections {
            self.database.jobs_max_connections = Some(max);
        }
        if let Some(count) = overrides.cache_shard_count {
            self.cache.shard_count = Some(count);
        }
        if let Some(limit) = overrides.cache_hydrate_limit {
            self.cache.hydrate_limit = Some(limit);
        }
        if let Some(schedule) = overrides.jobs_flush_schedule.as_ref() {
            self.jobs.flush_schedule = Some(schedule.clone());
        }
        if let Some(value) = overrides.jobs_consumer_concurrency {
            self.jobs.consumer_concurrency = Some(value);
        }
        if let Some(value) = overrides.jobs_intake_concurrency {
            self.jobs.intake_concurrency = Some(value);
        }

        self.apply_database_override(&overrides.database);
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            likes,
            jobs,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            likes: build_likes_settings(likes)?,
            jobs: build_jobs_settings(jobs)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let jobs_value = database
        .jobs_max_connections
        .unwrap_or(DEFAULT_DB_JOBS_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url,
        max_connections: non_zero_u32(max_value.into(), "database.max_connections")?,
        jobs_max_connections: non_zero_u32(jobs_value.into(), "database.jobs_max_connections")?,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let shard_count = non_zero_usize(
        cache.shard_count.unwrap_or(DEFAULT_CACHE_SHARD_COUNT),
        "cache.shard_count",
    )?;
    let hydrate_limit = non_zero_usize(
        cache.hydrate_limit.unwrap_or(DEFAULT_CACHE_HYDRATE_LIMIT),
        "cache.hydrate_limit",
    )?;
    let counter_ttl = ttl(
        cache
            .counter_ttl_seconds
            .unwrap_or(DEFAULT_CACHE_COUNTER_TTL_SECS),
        "cache.counter_ttl_seconds",
    )?;
    let user_actions_ttl = ttl(
        cache
            .user_actions_ttl_seconds
            .unwrap_or(DEFAULT_CACHE_USER_ACTIONS_TTL_SECS),
        "cache.user_actions_ttl_seconds",
    )?;

    Ok(CacheSettings {
        shard_count,
        counter_ttl,
        user_actions_ttl,
        hydrate_limit,
    })
}

fn build_likes_settings(likes: RawLikesSettings) -> Result<LikesSettings, LoadError> {
    let min_page_size = non_zero_u32(
        likes.min_page_size.unwrap_or(DEFAULT_LIKES_MIN_PAGE_SIZE),
        "likes.min_page_size",
    )?;
    let max_page_size = non_zero_u32(
        likes.max_page_size.unwrap_or(DEFAULT_LIKES_MAX_PAGE_SIZE),
        "likes.max_page_size",
    )?;
    if min_page_size > max_page_size {
        return Err(LoadError::invalid(
            "likes.max_page_size",
            format!("must be at least likes.min_page_size ({min_page_size})"),
        ));
    }

    Ok(LikesSettings {
        min_page_size,
        max_page_size,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let expression = jobs
        .flush_schedule
        .unwrap_or_else(|| DEFAULT_FLUSH_SCHEDULE.to_string());
    let flush_schedule = Schedule::from_str(expression.trim()).map_err(|err| {
        LoadError::invalid(
            "jobs.flush_schedule",
            format!("invalid cron expression `{expression}`: {err}"),
        )
    })?;
    let consumer_concurrency = non_zero_u32(
        jobs.consumer_concurrency
            .unwrap_or(DEFAULT_CONSUMER_CONCURRENCY),
        "jobs.consumer_concurrency",
    )?;
    let intake_concurrency = non_zero_u32(
        jobs.intake_concurrency
            .unwrap_or(DEFAULT_INTAKE_CONCURRENCY),
        "jobs.intake_concurrency",
    )?;

    Ok(JobsSettings {
        flush_schedule,
        consumer_concurrency,
        intake_concurrency,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    jobs_max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    shard_count: Option<u64>,
    counter_ttl_seconds: Option<u64>,
    user_actions_ttl_seconds: Option<u64>,
    hydrate_limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLikesSettings {
    min_page_size: Option<u64>,
    max_page_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    flush_schedule: Option<String>,
    consumer_concurrency: Option<u64>,
    intake_concurrency: Option<u64>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn ttl(seconds: u64, key: &'static str) -> Result<Duration, LoadError> {
    if seconds == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(seconds))
}
