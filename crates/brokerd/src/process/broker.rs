//! Ordered start-up and shutdown of one broker.

use std::sync::Arc;

use broker_config::{Config, DataPaths, Endpoint};
use broker_types::InstanceRecord;
use tracing::{info, warn};

use super::PROCESS_TARGET;
use super::control::{ControlChannel, ControlCommand, ControlReply};
use super::errors::BrokerError;
use super::heartbeat::HeartbeatLoop;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::instances::{InstanceGuard, InstanceRegistry, PeerVitals, ReapPolicy, SystemVitals};
use crate::ledger::{Clock, HeartbeatLedger, LedgerSettings, LedgerSnapshot, SystemClock};
use crate::protocol::ModelRegistry;
use crate::proxy::{Proxy, ProxySockets};
use crate::transport::{Context, DealerSocket, RouterOptions, RouterSocket, TransportError};
use crate::workers::{LedgerLiveness, Liveness, PoolSettings, SERVICE_NAME, WorkerPool};

/// Endpoint the dealer binds inside the broker's context.
pub const BACKEND_ENDPOINT: &str = "backend";

/// Collaborators a broker is started with.
#[derive(Clone)]
pub struct StartOptions {
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn HealthReporter>,
    vitals: Arc<dyn PeerVitals>,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            reporter: Arc::new(StructuredHealthReporter::new()),
            vitals: Arc::new(SystemVitals),
        }
    }
}

impl StartOptions {
    /// Replaces the ledger clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the health reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn HealthReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replaces the checks used to reap stale peer records.
    #[must_use]
    pub fn with_vitals(mut self, vitals: Arc<dyn PeerVitals>) -> Self {
        self.vitals = vitals;
        self
    }
}

/// A running broker.
///
/// The broker owns its transport context, sockets, worker threads, ledger
/// and instance record. [`Broker::stop`] releases them in reverse order of
/// acquisition; dropping the broker does the same on a best-effort basis.
pub struct Broker {
    running: Running,
    endpoint: Endpoint,
    port: u16,
    record: InstanceRecord,
    registry: InstanceRegistry,
    ledger: Arc<HeartbeatLedger>,
    reporter: Arc<dyn HealthReporter>,
}

impl Broker {
    /// Starts a broker with the production collaborators.
    pub fn start(config: &Config, models: ModelRegistry) -> Result<Self, BrokerError> {
        Self::start_with(config, models, StartOptions::default())
    }

    /// Starts a broker with injected collaborators.
    ///
    /// A failure at any step releases whatever the earlier steps acquired,
    /// the instance record included.
    pub fn start_with(
        config: &Config,
        models: ModelRegistry,
        options: StartOptions,
    ) -> Result<Self, BrokerError> {
        let reporter = Arc::clone(&options.reporter);
        reporter.broker_starting(config);
        match Self::launch(config, models, options) {
            Ok(broker) => {
                reporter.broker_ready(&broker.record, &broker.endpoint);
                Ok(broker)
            }
            Err(error) => {
                reporter.broker_failed(&error);
                Err(error)
            }
        }
    }

    fn launch(
        config: &Config,
        models: ModelRegistry,
        options: StartOptions,
    ) -> Result<Self, BrokerError> {
        let StartOptions {
            clock,
            reporter,
            vitals,
        } = options;
        config.validate()?;
        let paths = DataPaths::from_config(config)?;
        let registry = InstanceRegistry::open(&paths);
        let policy = ReapPolicy {
            stale_after: config.stale_after(),
        };
        for record in registry.reap_stale(&policy, vitals.as_ref())? {
            reporter.peer_reaped(&record);
        }

        let mut running = Running::new(Context::new());
        let backend = Endpoint::inproc(BACKEND_ENDPOINT);

        let router = running
            .context
            .bind_router(&config.frontend_endpoint(), RouterOptions::default())?;
        let port = router.port();
        let endpoint = config.frontend_endpoint().with_port(port);
        running.router = Some(router);

        running.dealer = Some(running.context.bind_dealer(&backend)?);

        let instance = registry.advertise(port)?;
        let record = instance.record().clone();
        running.instance = Some(instance);

        let ledger = Arc::new(HeartbeatLedger::new(LedgerSettings::from_config(config), clock));
        let liveness: Arc<dyn Liveness> =
            Arc::new(LedgerLiveness::new(Arc::clone(&ledger), SERVICE_NAME));
        let settings = PoolSettings {
            workers: config.worker_count(),
            heartbeat: config.heartbeat_interval(),
        };
        running.pool = Some(WorkerPool::spawn(
            &running.context,
            &backend,
            settings,
            &Arc::new(models),
            &liveness,
        )?);

        running.start_proxy()?;

        running.heartbeat = Some(HeartbeatLoop::spawn(
            Arc::clone(&ledger),
            Arc::clone(&reporter),
        )?);

        info!(
            target: PROCESS_TARGET,
            name = %record.name,
            endpoint = %endpoint,
            workers = config.worker_count(),
            "broker started"
        );
        Ok(Self {
            running,
            endpoint,
            port,
            record,
            registry,
            ledger,
            reporter,
        })
    }

    /// Port the front-end is bound to.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Front-end endpoint with the bound port.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Advertised instance record.
    #[must_use]
    pub fn record(&self) -> &InstanceRecord {
        &self.record
    }

    /// Copies the heartbeat ledger.
    #[must_use]
    pub fn ledger(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    /// Brokers currently advertised in the registry, this one included.
    pub fn peers(&self) -> Result<Vec<InstanceRecord>, BrokerError> {
        Ok(self.registry.list_peers()?)
    }

    /// Answers control requests until [`ControlCommand::Close`] arrives or
    /// every handle is dropped.
    pub fn serve_control(&self, channel: &ControlChannel) {
        while let Some(request) = channel.next() {
            let reply = match request.command {
                ControlCommand::Close => ControlReply::Closing,
                ControlCommand::Endpoint => ControlReply::Endpoint(self.endpoint.clone()),
                ControlCommand::Peers => match self.peers() {
                    Ok(peers) => ControlReply::Peers(peers),
                    Err(error) => ControlReply::Failed(error.to_string()),
                },
                ControlCommand::Ledger => ControlReply::Ledger(self.ledger()),
            };
            let closing = reply == ControlReply::Closing;
            if request.reply.send(reply).is_err() {
                warn!(target: PROCESS_TARGET, command = ?request.command, "control requester went away");
            }
            if closing {
                return;
            }
        }
    }

    /// Stops the broker and releases every resource.
    pub fn stop(mut self) -> Result<(), BrokerError> {
        self.reporter.broker_stopping(&self.record.name);
        let outcome = self.running.shutdown();
        self.reporter.broker_stopped(&self.record.name);
        outcome
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        if self.running.is_stopped() {
            return;
        }
        self.reporter.broker_stopping(&self.record.name);
        if let Err(error) = self.running.shutdown() {
            warn!(target: PROCESS_TARGET, error = %error, "broker shutdown reported an error");
        }
        self.reporter.broker_stopped(&self.record.name);
    }
}

/// Resources acquired so far, released in reverse order.
///
/// The router and dealer are moved into the proxy while it runs and handed
/// back when it stops.
struct Running {
    context: Context,
    router: Option<RouterSocket>,
    dealer: Option<DealerSocket>,
    instance: Option<InstanceGuard>,
    pool: Option<WorkerPool>,
    proxy: Option<Proxy>,
    heartbeat: Option<HeartbeatLoop>,
    stopped: bool,
}

impl Running {
    fn new(context: Context) -> Self {
        Self {
            context,
            router: None,
            dealer: None,
            instance: None,
            pool: None,
            proxy: None,
            heartbeat: None,
            stopped: false,
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn start_proxy(&mut self) -> Result<(), BrokerError> {
        let (Some(frontend), Some(backend)) = (self.router.take(), self.dealer.take()) else {
            return Err(TransportError::Closed.into());
        };
        self.proxy = Some(Proxy::spawn(&self.context, ProxySockets { frontend, backend })?);
        Ok(())
    }

    /// Releases everything in reverse order of acquisition; the first failure
    /// is reported after the rest has been released.
    fn shutdown(&mut self) -> Result<(), BrokerError> {
        let mut outcome = Ok(());
        let mut note = |result: Result<(), BrokerError>| {
            if let Err(error) = result {
                warn!(target: PROCESS_TARGET, error = %error, "shutdown step failed");
                if outcome.is_ok() {
                    outcome = Err(error);
                }
            }
        };

        if let Some(heartbeat) = self.heartbeat.take() {
            note(heartbeat.stop().map_err(BrokerError::from));
        }
        if let Some(proxy) = self.proxy.take() {
            match proxy.join() {
                Ok(ProxySockets { frontend, backend }) => {
                    self.router = Some(frontend);
                    self.dealer = Some(backend);
                }
                Err(error) => note(Err(BrokerError::from(error))),
            }
        }
        if let Some(pool) = self.pool.take() {
            pool.close();
            note(pool.join().map_err(BrokerError::from));
        }
        if let Some(instance) = self.instance.take() {
            // Record removal never fails the shutdown.
            if let Err(error) = instance.remove() {
                warn!(target: PROCESS_TARGET, error = %error, "failed to remove instance record");
            }
        }
        drop(self.dealer.take());
        drop(self.router.take());
        self.stopped = true;
        info!(target: PROCESS_TARGET, "broker resources released");
        outcome
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        if !self.is_stopped() {
            let _outcome = self.shutdown();
        }
    }
}
