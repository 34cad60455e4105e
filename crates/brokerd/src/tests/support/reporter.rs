//! Test double for [`HealthReporter`] that records lifecycle events.

use std::sync::Mutex;

use broker_config::{Config, Endpoint};
use broker_types::InstanceRecord;

use crate::health::HealthReporter;
use crate::process::BrokerError;

/// Health events tracked during tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    Starting,
    Ready(String),
    Failed(String),
    WorkerExpired(Vec<u8>),
    PeerReaped(String),
    Stopping(String),
    Stopped(String),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn broker_starting(&self, _config: &Config) {
        self.record(HealthEvent::Starting);
    }

    fn broker_ready(&self, record: &InstanceRecord, _endpoint: &Endpoint) {
        self.record(HealthEvent::Ready(record.name.clone()));
    }

    fn broker_failed(&self, error: &BrokerError) {
        self.record(HealthEvent::Failed(error.to_string()));
    }

    fn worker_expired(&self, worker: &[u8]) {
        self.record(HealthEvent::WorkerExpired(worker.to_vec()));
    }

    fn peer_reaped(&self, record: &InstanceRecord) {
        self.record(HealthEvent::PeerReaped(record.name.clone()));
    }

    fn broker_stopping(&self, name: &str) {
        self.record(HealthEvent::Stopping(name.to_owned()));
    }

    fn broker_stopped(&self, name: &str) {
        self.record(HealthEvent::Stopped(name.to_owned()));
    }
}
