//! Defines the unified error surface for broker start-up and supervision.

use std::sync::Arc;

use broker_config::{ConfigValidationError, DataPathsError};
use ortho_config::OrthoError;
use thiserror::Error;

use crate::instances::RegistryError;
use crate::telemetry::TelemetryError;
use crate::transport::TransportError;

use super::shutdown::ShutdownError;

/// Errors surfaced while starting, running or stopping a broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Configuration loaded but cannot be run.
    #[error("invalid configuration: {source}")]
    Validation {
        /// Rejected setting.
        #[source]
        source: ConfigValidationError,
    },
    /// Creating, binding or spawning a transport component failed.
    #[error("transport initialisation failed: {source}")]
    Transport {
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },
    /// Reading or writing the instance registry failed.
    #[error("instance registry failed: {source}")]
    Registry {
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
    /// The data directory could not be prepared.
    #[error("failed to prepare data directory: {source}")]
    DataPaths {
        /// Underlying filesystem error.
        #[source]
        source: DataPathsError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Installing or awaiting the shutdown listener failed.
    #[error("shutdown listener failed: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// A broker thread panicked.
    #[error("{component} thread panicked")]
    ThreadPanic {
        /// Thread group that panicked.
        component: &'static str,
    },
}

impl From<Arc<OrthoError>> for BrokerError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Config { source }
    }
}

impl From<ConfigValidationError> for BrokerError {
    fn from(source: ConfigValidationError) -> Self {
        Self::Validation { source }
    }
}

impl From<TransportError> for BrokerError {
    fn from(source: TransportError) -> Self {
        match source {
            TransportError::ThreadPanic { component } => Self::ThreadPanic { component },
            source => Self::Transport { source },
        }
    }
}

impl From<RegistryError> for BrokerError {
    fn from(source: RegistryError) -> Self {
        Self::Registry { source }
    }
}

impl From<DataPathsError> for BrokerError {
    fn from(source: DataPathsError) -> Self {
        Self::DataPaths { source }
    }
}

impl From<TelemetryError> for BrokerError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<ShutdownError> for BrokerError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
