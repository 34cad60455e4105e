//! Structured health reporting for broker lifecycle events.

use std::sync::Arc;

use broker_config::{Config, Endpoint};
use broker_types::InstanceRecord;

use crate::process::BrokerError;
use crate::transport::describe_identity;

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before any resource is acquired.
    fn broker_starting(&self, config: &Config);

    /// Invoked once the front-end is bound and the broker is advertised.
    fn broker_ready(&self, record: &InstanceRecord, endpoint: &Endpoint);

    /// Invoked when startup fails.
    fn broker_failed(&self, error: &BrokerError);

    /// Invoked when the heartbeat loop expires a silent worker.
    fn worker_expired(&self, worker: &[u8]);

    /// Invoked when a stale peer record is removed.
    fn peer_reaped(&self, record: &InstanceRecord);

    /// Invoked when shutdown begins.
    fn broker_stopping(&self, name: &str);

    /// Invoked once every resource has been released.
    fn broker_stopped(&self, name: &str);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn broker_starting(&self, config: &Config) {
        (**self).broker_starting(config);
    }

    fn broker_ready(&self, record: &InstanceRecord, endpoint: &Endpoint) {
        (**self).broker_ready(record, endpoint);
    }

    fn broker_failed(&self, error: &BrokerError) {
        (**self).broker_failed(error);
    }

    fn worker_expired(&self, worker: &[u8]) {
        (**self).worker_expired(worker);
    }

    fn peer_reaped(&self, record: &InstanceRecord) {
        (**self).peer_reaped(record);
    }

    fn broker_stopping(&self, name: &str) {
        (**self).broker_stopping(name);
    }

    fn broker_stopped(&self, name: &str) {
        (**self).broker_stopped(name);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn broker_starting(&self, config: &Config) {
        tracing::info!(
            target: "brokerd::health",
            event = "broker_starting",
            frontend = %config.frontend_endpoint(),
            workers = config.worker_count(),
            heartbeat_ms = config.heartbeat_interval().as_millis(),
            liveness = config.heartbeat_liveness(),
            "starting broker"
        );
    }

    fn broker_ready(&self, record: &InstanceRecord, endpoint: &Endpoint) {
        tracing::info!(
            target: "brokerd::health",
            event = "broker_ready",
            name = %record.name,
            port = %record.port,
            pid = record.pid,
            endpoint = %endpoint,
            "broker ready"
        );
    }

    fn broker_failed(&self, error: &BrokerError) {
        tracing::error!(
            target: "brokerd::health",
            event = "broker_failed",
            error = %error,
            "broker failed to start"
        );
    }

    fn worker_expired(&self, worker: &[u8]) {
        tracing::warn!(
            target: "brokerd::health",
            event = "worker_expired",
            worker = %describe_identity(worker),
            "worker missed its heartbeats and was removed"
        );
    }

    fn peer_reaped(&self, record: &InstanceRecord) {
        tracing::info!(
            target: "brokerd::health",
            event = "peer_reaped",
            name = %record.name,
            port = %record.port,
            pid = record.pid,
            "removed stale broker record"
        );
    }

    fn broker_stopping(&self, name: &str) {
        tracing::info!(
            target: "brokerd::health",
            event = "broker_stopping",
            name,
            "stopping broker"
        );
    }

    fn broker_stopped(&self, name: &str) {
        tracing::info!(
            target: "brokerd::health",
            event = "broker_stopped",
            name,
            "broker stopped"
        );
    }
}
