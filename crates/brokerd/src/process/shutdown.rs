//! Termination signals for the broker process.
//!
//! Handlers are installed before the broker starts so a signal that arrives
//! during start-up is still seen once the listener begins waiting.

use std::fmt;
use std::io;
use std::sync::Mutex;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use signal_hook::low_level::signal_name;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;
use crate::sync::lock;

/// Signals that stop the broker.
pub const TERMINATION_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// What ended a [`ShutdownSignal::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// A termination signal arrived.
    Signal(i32),
    /// The broker was asked to stop by other means.
    Requested,
    /// The listener was cancelled; nothing should be stopped on its behalf.
    Cancelled,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => {
                write!(formatter, "{}", signal_name(*signal).unwrap_or("unknown signal"))
            }
            Self::Requested => formatter.write_str("request"),
            Self::Cancelled => formatter.write_str("cancellation"),
        }
    }
}

/// Source of the broker's stop request.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until the broker should stop.
    fn wait(&self) -> Result<ShutdownCause, ShutdownError>;

    /// Releases a pending [`ShutdownSignal::wait`] with
    /// [`ShutdownCause::Cancelled`].
    fn cancel(&self) {}
}

/// Errors reported by shutdown listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Registering the signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Listener for [`TERMINATION_SIGNALS`].
pub struct SystemShutdownSignal {
    signals: Mutex<Signals>,
    handle: Handle,
}

impl SystemShutdownSignal {
    /// Registers the signal handlers.
    pub fn install() -> Result<Self, ShutdownError> {
        let signals =
            Signals::new(TERMINATION_SIGNALS).map_err(|source| ShutdownError::Install { source })?;
        let handle = signals.handle();
        Ok(Self {
            signals: Mutex::new(signals),
            handle,
        })
    }
}

impl fmt::Debug for SystemShutdownSignal {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SystemShutdownSignal")
            .field("closed", &self.handle.is_closed())
            .finish_non_exhaustive()
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<ShutdownCause, ShutdownError> {
        let mut signals = lock(&self.signals);
        let Some(signal) = signals.forever().next() else {
            return Ok(ShutdownCause::Cancelled);
        };
        let cause = ShutdownCause::Signal(signal);
        info!(target: PROCESS_TARGET, signal, cause = %cause, "shutdown signal received");
        Ok(cause)
    }

    fn cancel(&self) {
        self.handle.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn causes_name_their_signal() {
        assert_eq!(ShutdownCause::Signal(SIGTERM).to_string(), "SIGTERM");
        assert_eq!(ShutdownCause::Requested.to_string(), "request");
    }

    #[test]
    fn cancelling_releases_a_waiting_listener() {
        let listener = Arc::new(SystemShutdownSignal::install().expect("install handlers"));
        let waiting = Arc::clone(&listener);
        let waiter = thread::spawn(move || waiting.wait());

        listener.cancel();

        let cause = waiter.join().expect("waiter thread").expect("wait");
        assert_eq!(cause, ShutdownCause::Cancelled);
    }
}
