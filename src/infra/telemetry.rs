use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "kudos_counter_cache_hit_total",
            Unit::Count,
            "Counter lookups answered by the cache, including known-absent markers."
        );
        describe_counter!(
            "kudos_counter_cache_miss_total",
            Unit::Count,
            "Counter lookups that found no cached field."
        );
        describe_counter!(
            "kudos_user_actions_hydrate_total",
            Unit::Count,
            "User-action sets hydrated from the durable store."
        );
        describe_counter!(
            "kudos_like_applied_total",
            Unit::Count,
            "Like and unlike requests that changed state."
        );
        describe_counter!(
            "kudos_like_noop_total",
            Unit::Count,
            "Like and unlike requests rejected because the state already matched."
        );
        describe_counter!(
            "kudos_flush_published_total",
            Unit::Count,
            "Batch counts published by the flush job."
        );
        describe_counter!(
            "kudos_flush_failed_total",
            Unit::Count,
            "Counter scopes the flush job failed to scan or publish."
        );
        describe_histogram!(
            "kudos_flush_ms",
            Unit::Milliseconds,
            "Flush cycle latency in milliseconds."
        );
        describe_counter!(
            "kudos_batch_count_applied_total",
            Unit::Count,
            "Persisted counter rows updated by the batch-count consumers."
        );
    });
}
