//! Tracing subscriber setup for the CLI.

use clap::ValueEnum;
use thiserror::Error;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct TelemetryError(String);

/// Install the global subscriber. Level defaults to `info`; `RUST_LOG`
/// overrides it.
pub fn init(format: LogFormat) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    // stdout carries the run report, logs go to stderr
    let fmt_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| TelemetryError(err.to_string()))
}
