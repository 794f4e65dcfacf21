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
            "eventfeed_cache_hit_total",
            Unit::Count,
            "Total number of cache reads served from a live entry."
        );
        describe_counter!(
            "eventfeed_cache_miss_total",
            Unit::Count,
            "Total number of cache reads that found no live entry."
        );
        describe_counter!(
            "eventfeed_cache_expired_total",
            Unit::Count,
            "Total number of entries dropped because their TTL had elapsed."
        );
        describe_counter!(
            "eventfeed_cache_invalidated_total",
            Unit::Count,
            "Total number of entries removed by pattern invalidation."
        );
        describe_counter!(
            "eventfeed_cache_coalesced_total",
            Unit::Count,
            "Total number of cache misses that joined an in-flight fetch."
        );
        describe_histogram!(
            "eventfeed_feed_fetch_ms",
            Unit::Milliseconds,
            "Page fetch latency in milliseconds, labelled by feed."
        );
    });
}
