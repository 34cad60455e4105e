//! Broker lifecycle: ordered start-up, control channel and shutdown.

mod broker;
mod control;
mod errors;
mod heartbeat;
mod launch;
mod shutdown;

pub use broker::{BACKEND_ENDPOINT, Broker, StartOptions};
pub use control::{ControlChannel, ControlCommand, ControlError, ControlHandle, ControlReply, control_channel};
pub use errors::BrokerError;
pub use launch::{ConfigLoader, StaticConfigLoader, SystemConfigLoader, run_broker, run_broker_with};
pub use shutdown::{
    ShutdownCause, ShutdownError, ShutdownSignal, SystemShutdownSignal, TERMINATION_SIGNALS,
};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
