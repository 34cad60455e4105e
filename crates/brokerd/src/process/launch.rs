//! Runs the broker as a process: configuration, telemetry, signals.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use broker_config::Config;
use ortho_config::OrthoError;
use tracing::{error, info};

use super::PROCESS_TARGET;
use super::broker::{Broker, StartOptions};
use super::control::{ControlCommand, ControlHandle, control_channel};
use super::errors::BrokerError;
use super::shutdown::{ShutdownCause, ShutdownSignal, SystemShutdownSignal};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::protocol::ModelRegistry;
use crate::telemetry;
use crate::transport::TransportError;

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the broker configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that returns a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Runs a broker with the built-in models until a termination signal.
///
/// Signal handlers are registered before configuration is loaded.
pub fn run_broker() -> Result<(), BrokerError> {
    let shutdown = SystemShutdownSignal::install()?;
    let reporter: Arc<dyn HealthReporter> = Arc::new(StructuredHealthReporter::new());
    run_broker_with(
        &SystemConfigLoader,
        shutdown,
        reporter,
        ModelRegistry::with_builtins(),
    )
}

/// Runs a broker with injected collaborators.
///
/// The shutdown signal is awaited on its own thread and turned into a
/// [`ControlCommand::Close`]; the calling thread serves control requests
/// until then. The listener is cancelled and joined before the broker stops.
pub fn run_broker_with<S>(
    loader: &dyn ConfigLoader,
    shutdown: S,
    reporter: Arc<dyn HealthReporter>,
    models: ModelRegistry,
) -> Result<(), BrokerError>
where
    S: ShutdownSignal + 'static,
{
    let config = loader.load()?;
    telemetry::initialise(&config)?;
    let options = StartOptions::default().with_reporter(reporter);
    let broker = Broker::start_with(&config, models, options)?;

    let shutdown = Arc::new(shutdown);
    let (handle, channel) = control_channel();
    let listener = spawn_signal_listener(Arc::clone(&shutdown), handle)?;
    broker.serve_control(&channel);

    shutdown.cancel();
    let cause = listener
        .join()
        .map_err(|_| BrokerError::ThreadPanic { component: "signals" })?;
    info!(target: PROCESS_TARGET, cause = %cause, "stopping broker");
    broker.stop()?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}

fn spawn_signal_listener<S>(
    shutdown: Arc<S>,
    handle: ControlHandle,
) -> Result<JoinHandle<ShutdownCause>, BrokerError>
where
    S: ShutdownSignal + 'static,
{
    thread::Builder::new()
        .name("broker-signals".to_owned())
        .spawn(move || {
            let cause = shutdown.wait().unwrap_or_else(|source| {
                error!(target: PROCESS_TARGET, error = %source, "shutdown listener failed; closing");
                ShutdownCause::Requested
            });
            if cause != ShutdownCause::Cancelled {
                // The control loop may already have returned.
                let _reply = handle.request(ControlCommand::Close);
            }
            cause
        })
        .map_err(|source| {
            BrokerError::from(TransportError::Spawn {
                component: "signals",
                source,
            })
        })
}
