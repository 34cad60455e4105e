//! Worker pool behind the in-process dealer.
//!
//! The dealer hands each request to the next connected worker in turn.
//! Workers decode the payload, run it against the model registry and send
//! the reply back through the dealer with the routing prefix intact. Each
//! worker reports ready, busy and keepalive events through [`Liveness`],
//! which the broker records in its heartbeat ledger.

mod pool;
mod tracking;
mod worker;

pub(crate) use self::pool::{PoolSettings, WorkerPool};
pub(crate) use self::tracking::LedgerLiveness;
pub use self::worker::Liveness;
pub(crate) use self::worker::run_worker;

/// Service every pool worker registers under.
pub const SERVICE_NAME: &str = "broker";

pub(crate) const WORKERS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::workers");
