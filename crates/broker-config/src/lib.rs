//! Shared configuration for the broker daemon and its embedders.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults, then an
//! optional configuration file, then `BROKER_*` environment variables, then
//! command-line flags. Every field is optional on the wire; accessors apply
//! the defaults published in this crate so callers never see a gap.

mod defaults;
mod endpoint;
mod logging;
mod paths;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_FRONTEND_HOST, DEFAULT_FRONTEND_PORT, DEFAULT_HEARTBEAT_INTERVAL_MS,
    DEFAULT_HEARTBEAT_LIVENESS, DEFAULT_LOG_FILTER, DEFAULT_STALE_AFTER_SECS, DEFAULT_WORKERS,
    VERBOSE_LOG_FILTER, default_data_dir, default_log_format,
};
pub use endpoint::{Endpoint, EndpointParseError};
pub use logging::{LogFormat, LogFormatParseError};
pub use paths::{DataPaths, DataPathsError};

/// Resolved broker configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "BROKER")]
pub struct Config {
    /// Host the front-end router binds to.
    pub frontend_host: Option<String>,
    /// Port the front-end router binds to. `0` selects an ephemeral port.
    pub frontend_port: Option<u16>,
    /// Number of worker threads connected to the back-end dealer.
    pub workers: Option<usize>,
    /// Heartbeat tick in milliseconds.
    pub heartbeat_interval_ms: Option<u64>,
    /// Number of missed heartbeats after which a worker is considered dead.
    pub heartbeat_liveness: Option<u32>,
    /// Root directory holding the broker instance registry.
    pub data_dir: Option<Utf8PathBuf>,
    /// Age in seconds after which an unreachable instance record is stale.
    pub stale_after_secs: Option<u64>,
    /// `tracing` filter expression.
    pub log_filter: Option<String>,
    /// Log output format.
    pub log_format: Option<LogFormat>,
    /// Raises the default log filter to `debug`.
    pub verbose: Option<bool>,
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads configuration from an explicit argument list.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Host the front-end binds to.
    #[must_use]
    pub fn frontend_host(&self) -> &str {
        self.frontend_host.as_deref().unwrap_or(DEFAULT_FRONTEND_HOST)
    }

    /// Port the front-end binds to.
    #[must_use]
    pub fn frontend_port(&self) -> u16 {
        self.frontend_port.unwrap_or(DEFAULT_FRONTEND_PORT)
    }

    /// Front-end endpoint in `tcp://host:port` form.
    #[must_use]
    pub fn frontend_endpoint(&self) -> Endpoint {
        Endpoint::tcp(self.frontend_host(), self.frontend_port())
    }

    /// Size of the worker pool.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or(DEFAULT_WORKERS)
    }

    /// Heartbeat tick.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(
            self.heartbeat_interval_ms
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS),
        )
    }

    /// Number of heartbeats a worker may miss before it is reaped.
    #[must_use]
    pub fn heartbeat_liveness(&self) -> u32 {
        self.heartbeat_liveness.unwrap_or(DEFAULT_HEARTBEAT_LIVENESS)
    }

    /// Window after the last heartbeat during which a worker stays alive.
    #[must_use]
    pub fn heartbeat_expiry(&self) -> Duration {
        self.heartbeat_interval()
            .saturating_mul(self.heartbeat_liveness())
    }

    /// Explicitly configured data directory, if any.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Utf8Path> {
        self.data_dir.as_deref()
    }

    /// Age after which an unreachable instance record is considered stale.
    #[must_use]
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs.unwrap_or(DEFAULT_STALE_AFTER_SECS))
    }

    /// Whether verbose logging was requested.
    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }

    /// Effective log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        match self.log_filter.as_deref() {
            Some(filter) => filter,
            None if self.verbose() => VERBOSE_LOG_FILTER,
            None => DEFAULT_LOG_FILTER,
        }
    }

    /// Effective log format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Rejects settings the broker cannot run with.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.worker_count() == 0 {
            return Err(ConfigValidationError::NoWorkers);
        }
        if self.heartbeat_interval().is_zero() {
            return Err(ConfigValidationError::ZeroHeartbeatInterval);
        }
        if self.heartbeat_liveness() == 0 {
            return Err(ConfigValidationError::ZeroLiveness);
        }
        Ok(())
    }
}

/// Settings rejected by [`Config::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    /// The worker pool would be empty.
    #[error("worker count must be at least 1")]
    NoWorkers,
    /// The heartbeat loop would spin.
    #[error("heartbeat interval must be greater than zero")]
    ZeroHeartbeatInterval,
    /// Workers would expire immediately.
    #[error("heartbeat liveness must be at least 1")]
    ZeroLiveness,
}
