//! Test harness utilities shared by the broker suites.

mod client;
mod config;
mod reporter;

pub use client::{REPLY_TIMEOUT, connect_client, request, send_request, wait_until};
pub use config::{Scratch, scratch};
pub use reporter::{HealthEvent, RecordingHealthReporter};
