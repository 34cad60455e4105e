//! Worker reports recorded in the heartbeat ledger.

use std::sync::Arc;

use super::Liveness;
use crate::ledger::HeartbeatLedger;

/// Files every worker report under one service.
pub(crate) struct LedgerLiveness {
    ledger: Arc<HeartbeatLedger>,
    service: String,
}

impl LedgerLiveness {
    pub(crate) fn new(ledger: Arc<HeartbeatLedger>, service: &str) -> Self {
        Self {
            ledger,
            service: service.to_owned(),
        }
    }
}

impl Liveness for LedgerLiveness {
    fn ready(&self, worker: &[u8]) {
        self.ledger.ready(worker, Some(&self.service));
    }

    fn busy(&self, worker: &[u8]) {
        self.ledger.busy(worker, Some(&self.service));
    }

    fn alive(&self, worker: &[u8]) {
        self.ledger.heartbeat(worker, Some(&self.service));
    }
}
