//! Heartbeat and expiry ledger.
//!
//! The ledger tracks every worker the broker knows about and how many
//! requests each service has in flight. Requests themselves are balanced by
//! the back-end dealer; the ledger only records which workers are idle, which
//! are busy and when each must next be heard from. Workers and services live
//! in two separate maps keyed by identifier; a worker names its service and a
//! service lists the ids of its waiting workers, but neither owns the other.
//! A single mutex guards both maps.
//!
//! Each registration or keepalive pushes a worker's expiry to
//! `now + interval * liveness`. [`HeartbeatLedger::purge`] drops workers whose
//! expiry has passed, releasing any request they held, along with services
//! left with no workers and nothing in flight.

mod clock;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use broker_config::Config;
use tracing::debug;

pub use self::clock::{Clock, ManualClock, SystemClock};
use crate::sync::lock;
use crate::transport::describe_identity;

pub(crate) const LEDGER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::ledger");

/// Worker identity as assigned by the dealer.
pub type WorkerId = Vec<u8>;

/// Heartbeat tick and miss tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    interval: Duration,
    liveness: u32,
}

impl LedgerSettings {
    /// Creates settings from a tick interval and the number of ticks a worker
    /// may miss.
    #[must_use]
    pub const fn new(interval: Duration, liveness: u32) -> Self {
        Self { interval, liveness }
    }

    /// Reads the heartbeat settings from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.heartbeat_interval(), config.heartbeat_liveness())
    }

    /// Heartbeat tick.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Ticks a worker may miss.
    #[must_use]
    pub const fn liveness(&self) -> u32 {
        self.liveness
    }

    /// Lifetime granted by one heartbeat.
    #[must_use]
    pub fn expiry(&self) -> Duration {
        self.interval.saturating_mul(self.liveness)
    }
}

/// Whether a worker can take a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Idle and queued on its service.
    Waiting,
    /// Handling a request.
    Busy,
}

/// Outcome of one [`HeartbeatLedger::purge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Workers removed for missing their heartbeats, sorted.
    pub expired: Vec<WorkerId>,
    /// Services removed for having no workers and nothing in flight, sorted.
    pub removed_services: Vec<String>,
}

impl PurgeReport {
    /// Returns true when nothing was removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.removed_services.is_empty()
    }
}

/// Point-in-time copy of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    /// Known workers, sorted by id.
    pub workers: Vec<WorkerSnapshot>,
    /// Known services, sorted by name.
    pub services: Vec<ServiceSnapshot>,
}

/// One worker in a [`LedgerSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSnapshot {
    /// Dealer identity.
    pub id: WorkerId,
    /// Service the worker serves.
    pub service: Option<String>,
    /// Current state.
    pub state: WorkerState,
    /// Time left before the worker expires.
    pub expires_in: Duration,
}

/// One service in a [`LedgerSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSnapshot {
    /// Service name.
    pub name: String,
    /// Requests handed to a worker and not yet answered.
    pub pending: usize,
    /// Idle workers.
    pub waiting: usize,
}

/// Worker and service bookkeeping shared by the workers and the heartbeat
/// loop.
pub struct HeartbeatLedger {
    settings: LedgerSettings,
    clock: Arc<dyn Clock>,
    state: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    workers: HashMap<WorkerId, WorkerRecord>,
    services: HashMap<String, ServiceRecord>,
}

#[derive(Debug)]
struct WorkerRecord {
    service: Option<String>,
    expiry: Instant,
    state: WorkerState,
}

#[derive(Debug, Default)]
struct ServiceRecord {
    in_flight: usize,
    waiting: VecDeque<WorkerId>,
}

impl ServiceRecord {
    fn park(&mut self, id: &[u8]) {
        if !self.waiting.iter().any(|queued| queued == id) {
            self.waiting.push_back(id.to_vec());
        }
    }

    fn unpark(&mut self, id: &[u8]) {
        self.waiting.retain(|queued| queued != id);
    }
}

impl LedgerState {
    fn register(&mut self, id: &[u8], service: Option<&str>, expiry: Instant, state: WorkerState) {
        self.workers.insert(
            id.to_vec(),
            WorkerRecord {
                service: service.map(str::to_owned),
                expiry,
                state,
            },
        );
        if let Some(name) = service {
            let record = self.services.entry(name.to_owned()).or_default();
            match state {
                WorkerState::Waiting => record.park(id),
                WorkerState::Busy => record.in_flight += 1,
            }
        }
        debug!(
            target: LEDGER_TARGET,
            worker = %describe_identity(id),
            service = service.unwrap_or("-"),
            state = ?state,
            "worker registered"
        );
    }

    /// Drops a worker, releasing the request it held.
    fn forget(&mut self, id: &[u8]) -> Option<WorkerRecord> {
        let record = self.workers.remove(id)?;
        if let Some(service) = record
            .service
            .as_deref()
            .and_then(|name| self.services.get_mut(name))
        {
            service.unpark(id);
            if record.state == WorkerState::Busy {
                service.in_flight = service.in_flight.saturating_sub(1);
            }
        }
        Some(record)
    }
}

impl HeartbeatLedger {
    /// Creates an empty ledger.
    pub fn new(settings: LedgerSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Heartbeat settings in force.
    #[must_use]
    pub fn settings(&self) -> LedgerSettings {
        self.settings
    }

    /// Renews a worker's expiry, registering it as waiting if unknown.
    ///
    /// Returns true when the worker was newly registered.
    pub fn heartbeat(&self, id: &[u8], service: Option<&str>) -> bool {
        let expiry = self.clock.now() + self.settings.expiry();
        let mut state = lock(&self.state);
        if let Some(record) = state.workers.get_mut(id) {
            record.expiry = expiry;
            return false;
        }
        state.register(id, service, expiry, WorkerState::Waiting);
        true
    }

    /// Marks a worker idle and parks it on its service.
    ///
    /// A worker leaving the busy state releases its in-flight request. Also
    /// renews the worker's expiry; unknown workers are registered.
    pub fn ready(&self, id: &[u8], service: Option<&str>) {
        let expiry = self.clock.now() + self.settings.expiry();
        let mut state = lock(&self.state);
        if !state.workers.contains_key(id) {
            state.register(id, service, expiry, WorkerState::Waiting);
            return;
        }
        let LedgerState { workers, services } = &mut *state;
        let Some(record) = workers.get_mut(id) else {
            return;
        };
        record.expiry = expiry;
        if record.service.is_none() {
            record.service = service.map(str::to_owned);
        }
        let was_busy = record.state == WorkerState::Busy;
        record.state = WorkerState::Waiting;
        if let Some(name) = record.service.as_deref() {
            let service = services.entry(name.to_owned()).or_default();
            if was_busy {
                service.in_flight = service.in_flight.saturating_sub(1);
            }
            service.park(id);
        }
    }

    /// Marks a worker as handling a request.
    ///
    /// Also renews the worker's expiry; unknown workers are registered busy.
    pub fn busy(&self, id: &[u8], service: Option<&str>) {
        let expiry = self.clock.now() + self.settings.expiry();
        let mut state = lock(&self.state);
        if !state.workers.contains_key(id) {
            state.register(id, service, expiry, WorkerState::Busy);
            return;
        }
        let LedgerState { workers, services } = &mut *state;
        let Some(record) = workers.get_mut(id) else {
            return;
        };
        record.expiry = expiry;
        if record.service.is_none() {
            record.service = service.map(str::to_owned);
        }
        if record.state == WorkerState::Busy {
            return;
        }
        record.state = WorkerState::Busy;
        if let Some(name) = record.service.as_deref() {
            let service = services.entry(name.to_owned()).or_default();
            service.unpark(id);
            service.in_flight += 1;
        }
    }

    /// Forgets a worker. Returns true when it was known.
    pub fn evict(&self, id: &[u8]) -> bool {
        if lock(&self.state).forget(id).is_none() {
            return false;
        }
        debug!(target: LEDGER_TARGET, worker = %describe_identity(id), "worker evicted");
        true
    }

    /// Removes expired workers and empty services.
    pub fn purge(&self) -> PurgeReport {
        let now = self.clock.now();
        let mut state = lock(&self.state);

        let mut expired: Vec<WorkerId> = state
            .workers
            .iter()
            .filter(|(_, record)| record.expiry <= now)
            .map(|(id, _)| id.clone())
            .collect();
        expired.sort();
        for id in &expired {
            state.forget(id);
        }

        let LedgerState { workers, services } = &mut *state;

        let served: HashSet<&str> = workers
            .values()
            .filter_map(|record| record.service.as_deref())
            .collect();
        let mut removed_services: Vec<String> = services
            .iter()
            .filter(|(name, record)| record.in_flight == 0 && !served.contains(name.as_str()))
            .map(|(name, _)| name.clone())
            .collect();
        removed_services.sort();
        for name in &removed_services {
            services.remove(name);
        }

        PurgeReport {
            expired,
            removed_services,
        }
    }

    /// Returns true when the worker is registered.
    #[must_use]
    pub fn contains(&self, id: &[u8]) -> bool {
        lock(&self.state).workers.contains_key(id)
    }

    /// Number of registered workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        lock(&self.state).workers.len()
    }

    /// Number of requests a service's workers are handling.
    #[must_use]
    pub fn pending(&self, service: &str) -> usize {
        lock(&self.state)
            .services
            .get(service)
            .map_or(0, |record| record.in_flight)
    }

    /// Copies the current state.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        let now = self.clock.now();
        let state = lock(&self.state);
        let mut workers: Vec<WorkerSnapshot> = state
            .workers
            .iter()
            .map(|(id, record)| WorkerSnapshot {
                id: id.clone(),
                service: record.service.clone(),
                state: record.state,
                expires_in: record.expiry.saturating_duration_since(now),
            })
            .collect();
        workers.sort_by(|left, right| left.id.cmp(&right.id));
        let mut services: Vec<ServiceSnapshot> = state
            .services
            .iter()
            .map(|(name, record)| ServiceSnapshot {
                name: name.clone(),
                pending: record.in_flight,
                waiting: record.waiting.len(),
            })
            .collect();
        services.sort_by(|left, right| left.name.cmp(&right.name));
        LedgerSnapshot { workers, services }
    }
}
