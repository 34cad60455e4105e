//! Behavioural tests for heartbeat expiry on a manual clock.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::ledger::{Clock, HeartbeatLedger, LedgerSettings, ManualClock, PurgeReport};
use crate::workers::SERVICE_NAME;

type StepResult = Result<(), String>;

#[derive(Default)]
struct LedgerWorld {
    clock: Arc<ManualClock>,
    ledger: Option<HeartbeatLedger>,
    last_purge: PurgeReport,
}

impl LedgerWorld {
    fn ledger(&self) -> Result<&HeartbeatLedger, String> {
        self.ledger
            .as_ref()
            .ok_or_else(|| "ledger not configured".to_owned())
    }
}

#[fixture]
fn world() -> RefCell<LedgerWorld> {
    RefCell::new(LedgerWorld::default())
}

#[given("a ledger ticking every {interval} ms with liveness {liveness}")]
fn given_ledger(world: &RefCell<LedgerWorld>, interval: u64, liveness: u32) {
    let mut world = world.borrow_mut();
    let clock: Arc<dyn Clock> = Arc::clone(&world.clock) as Arc<dyn Clock>;
    let settings = LedgerSettings::new(Duration::from_millis(interval), liveness);
    world.ledger = Some(HeartbeatLedger::new(settings, clock));
}

#[when("worker {id} reports ready")]
fn when_worker_ready(world: &RefCell<LedgerWorld>, id: String) -> StepResult {
    world.borrow().ledger()?.ready(id.as_bytes(), Some(SERVICE_NAME));
    Ok(())
}

#[when("worker {id} sends a heartbeat")]
fn when_worker_heartbeats(world: &RefCell<LedgerWorld>, id: String) -> StepResult {
    world.borrow().ledger()?.heartbeat(id.as_bytes(), Some(SERVICE_NAME));
    Ok(())
}

#[when("worker {id} picks up a request")]
fn when_worker_busy(world: &RefCell<LedgerWorld>, id: String) -> StepResult {
    world.borrow().ledger()?.busy(id.as_bytes(), Some(SERVICE_NAME));
    Ok(())
}

#[when("{millis} ms pass")]
fn when_time_passes(world: &RefCell<LedgerWorld>, millis: u64) {
    world.borrow().clock.advance(Duration::from_millis(millis));
}

#[when("the ledger is purged")]
fn when_purged(world: &RefCell<LedgerWorld>) -> StepResult {
    let report = world.borrow().ledger()?.purge();
    world.borrow_mut().last_purge = report;
    Ok(())
}

#[then("worker {id} is registered")]
fn then_registered(world: &RefCell<LedgerWorld>, id: String) -> StepResult {
    assert!(world.borrow().ledger()?.contains(id.as_bytes()));
    Ok(())
}

#[then("worker {id} is gone")]
fn then_gone(world: &RefCell<LedgerWorld>, id: String) -> StepResult {
    assert!(!world.borrow().ledger()?.contains(id.as_bytes()));
    Ok(())
}

#[then("the purge expired {id}")]
fn then_purge_expired(world: &RefCell<LedgerWorld>, id: String) {
    assert_eq!(world.borrow().last_purge.expired, vec![id.into_bytes()]);
}

#[then("{count} requests are in flight")]
fn then_pending(world: &RefCell<LedgerWorld>, count: usize) -> StepResult {
    assert_eq!(world.borrow().ledger()?.pending(SERVICE_NAME), count);
    Ok(())
}

#[scenario(
    path = "tests/features/heartbeat_ledger.feature",
    name = "A silent worker expires after missing its heartbeats"
)]
fn silent_worker_expires(world: RefCell<LedgerWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/heartbeat_ledger.feature",
    name = "Heartbeats keep a worker alive"
)]
fn heartbeats_keep_worker_alive(world: RefCell<LedgerWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/heartbeat_ledger.feature",
    name = "An expired busy worker releases its request"
)]
fn expired_busy_worker_releases_request(world: RefCell<LedgerWorld>) {
    drop(world);
}
