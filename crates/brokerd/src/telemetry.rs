//! Process-wide tracing setup for the broker binary and embedders.
//!
//! Records go to stderr with RFC 3339 UTC timestamps, targets and thread
//! names, either as flattened JSON objects or as compact lines. The
//! subscriber is installed once per process; the format chosen by the first
//! caller stays in force.

use std::io::{self, IsTerminal};

use broker_config::{Config, LogFormat};
use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, registry};

const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Proof that telemetry is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Output format of the installed subscriber.
    #[must_use]
    pub fn format(&self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression did not parse.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// Expression as configured.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Another subscriber already owns the process.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Installs the global subscriber described by `config` on first use.
///
/// Later calls leave the installed subscriber alone and report its format.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| install(config))
        .map(|format| TelemetryHandle { format: *format })
}

fn install(config: &Config) -> Result<LogFormat, TelemetryError> {
    let filter = parse_filter(config.log_filter())?;
    let format = config.log_format();

    let json = (format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_thread_names(true)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(io::stderr)
    });
    let compact = (format == LogFormat::Compact).then(|| {
        fmt::layer()
            .compact()
            .with_thread_names(true)
            .with_timer(UtcTime::rfc_3339())
            .with_ansi(io::stderr().is_terminal())
            .with_writer(io::stderr)
    });

    registry().with(filter).with(json).with(compact).try_init()?;
    tracing::info!(
        target: TELEMETRY_TARGET,
        format = %format,
        filter = config.log_filter(),
        "telemetry initialised"
    );
    Ok(format)
}

fn parse_filter(expression: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(expression).map_err(|error| TelemetryError::Filter {
        filter: expression.to_owned(),
        message: error.to_string(),
    })
}
