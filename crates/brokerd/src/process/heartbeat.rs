//! Heartbeat tick driving the ledger purge.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};

use tracing::debug;

use super::PROCESS_TARGET;
use crate::health::HealthReporter;
use crate::ledger::HeartbeatLedger;
use crate::transport::TransportError;

/// Thread that purges the ledger once per heartbeat interval.
pub(crate) struct HeartbeatLoop {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatLoop {
    pub(crate) fn spawn(
        ledger: Arc<HeartbeatLedger>,
        reporter: Arc<dyn HealthReporter>,
    ) -> Result<Self, TransportError> {
        let (stop, stopped) = mpsc::channel::<()>();
        let interval = ledger.settings().interval();
        let handle = thread::Builder::new()
            .name("broker-heartbeat".to_owned())
            .spawn(move || {
                while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(interval) {
                    tick(&ledger, reporter.as_ref());
                }
                debug!(target: PROCESS_TARGET, "heartbeat loop stopped");
            })
            .map_err(|source| TransportError::Spawn {
                component: "heartbeat",
                source,
            })?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Stops the loop and waits for the thread.
    pub(crate) fn stop(mut self) -> Result<(), TransportError> {
        if self.halt() {
            return Err(TransportError::ThreadPanic {
                component: "heartbeat",
            });
        }
        Ok(())
    }

    fn halt(&mut self) -> bool {
        drop(self.stop.take());
        self.handle
            .take()
            .is_some_and(|handle| handle.join().is_err())
    }
}

impl Drop for HeartbeatLoop {
    fn drop(&mut self) {
        let _panicked = self.halt();
    }
}

fn tick(ledger: &HeartbeatLedger, reporter: &dyn HealthReporter) {
    let report = ledger.purge();
    for worker in &report.expired {
        reporter.worker_expired(worker);
    }
    if !report.removed_services.is_empty() {
        debug!(
            target: PROCESS_TARGET,
            services = ?report.removed_services,
            "removed idle services"
        );
    }
}
