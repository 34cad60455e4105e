//! Test suites for the broker.

mod ledger_behaviour;
mod support;
