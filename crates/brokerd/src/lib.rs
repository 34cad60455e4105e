//! Request/reply message broker.
//!
//! A [`Broker`] accepts client requests on a ZeroMQ ROUTER bound over TCP and
//! proxies each to one of a fixed pool of worker threads behind an in-process
//! DEALER. Workers report ready, busy and keepalive events to a
//! heartbeat-tracked ledger. They decode the `{type, command, data}`
//! envelope, resolve the type through a runtime [`ModelRegistry`] and
//! reply through the same path, keeping the client's routing frames intact.
//!
//! Every running broker advertises itself with a record in a shared on-disk
//! registry ([`InstanceRegistry`]) so peers can discover one another and
//! records left by crashed brokers can be reaped.
//!
//! ```no_run
//! use broker_config::Config;
//! use brokerd::{Broker, ModelRegistry};
//!
//! # fn main() -> Result<(), brokerd::BrokerError> {
//! let broker = Broker::start(&Config::default(), ModelRegistry::with_builtins())?;
//! println!("listening on {}", broker.endpoint());
//! broker.stop()?;
//! # Ok(())
//! # }
//! ```

mod health;
pub mod instances;
pub mod ledger;
mod process;
pub mod protocol;
mod proxy;
mod sync;
mod telemetry;
pub mod transport;
mod workers;

pub use health::{HealthReporter, StructuredHealthReporter};
pub use instances::{InstanceGuard, InstanceRegistry, PeerVitals, ReapPolicy, RegistryError, SystemVitals};
pub use ledger::{Clock, HeartbeatLedger, LedgerSettings, LedgerSnapshot, ManualClock, SystemClock};
pub use process::{
    BACKEND_ENDPOINT, Broker, BrokerError, ConfigLoader, ControlChannel, ControlCommand,
    ControlError, ControlHandle, ControlReply, ShutdownCause, ShutdownError, ShutdownSignal, StartOptions,
    StaticConfigLoader, SystemConfigLoader, SystemShutdownSignal, control_channel, run_broker,
    run_broker_with,
};
pub use protocol::{Command, Envelope, Model, ModelRegistry, ProtocolError, Repository, Schema};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use workers::{Liveness, SERVICE_NAME};

#[cfg(test)]
mod tests;
