//! Client-side helpers for talking to a running broker.

use std::thread;
use std::time::{Duration, Instant};

use broker_config::Endpoint;
use broker_types::Reply;

use crate::process::Broker;
use crate::transport::{Context, ZmqSocket};

/// How long a test waits for a reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects an anonymous client to a broker's loopback front-end.
pub fn connect_client(port: u16) -> ZmqSocket {
    Context::new()
        .connect(&Endpoint::tcp("127.0.0.1", port), b"")
        .expect("connect")
}

/// Sends `payload` on `client` and parses the reply.
pub fn request(client: &ZmqSocket, payload: &[u8]) -> Reply {
    let bytes = client
        .request(payload, REPLY_TIMEOUT)
        .expect("request")
        .expect("reply within timeout");
    Reply::from_slice(&bytes).expect("reply json")
}

/// Connects a fresh client, sends `payload` and parses the reply.
pub fn send_request(broker: &Broker, payload: &[u8]) -> Reply {
    request(&connect_client(broker.port()), payload)
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}
