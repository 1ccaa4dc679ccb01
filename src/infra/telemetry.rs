use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::render::{
    METRIC_BATCH_MS, METRIC_BATCHES_TOTAL, METRIC_FAILURES_TOTAL, METRIC_FALLBACK_TOTAL,
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
            METRIC_BATCHES_TOTAL,
            Unit::Count,
            "Attendance batches rendered, labelled by the path that produced them."
        );
        describe_counter!(
            METRIC_FALLBACK_TOTAL,
            Unit::Count,
            "Batches re-run sequentially after the concurrent path failed."
        );
        describe_counter!(
            METRIC_FAILURES_TOTAL,
            Unit::Count,
            "Render path failures, labelled by path."
        );
        describe_histogram!(
            METRIC_BATCH_MS,
            Unit::Milliseconds,
            "End-to-end attendance batch render latency in milliseconds."
        );
    });
}
