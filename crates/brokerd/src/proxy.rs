//! Steerable ZeroMQ proxy between the client-facing router and the back-end
//! dealer.
//!
//! Requests arriving on the router are handed to the dealer, which
//! load-balances them across connected workers; replies arriving on the
//! dealer go back out through the router, which routes them by their leading
//! identity frame. Frames cross unchanged in both directions.

use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::transport::{Context, DealerSocket, RouterSocket, TransportError};

const PROXY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::proxy");
const CONTROL_ENDPOINT: &str = "inproc://proxy-control";
const TERMINATE: &str = "TERMINATE";

/// Sockets the proxy pumps between; handed back once it stops.
#[derive(Debug)]
pub(crate) struct ProxySockets {
    pub(crate) frontend: RouterSocket,
    pub(crate) backend: DealerSocket,
}

/// Running proxy thread.
pub(crate) struct Proxy {
    control: zmq::Socket,
    handle: Option<JoinHandle<Result<ProxySockets, TransportError>>>,
}

impl Proxy {
    /// Starts pumping between `sockets` on a dedicated thread.
    ///
    /// The control pair lives in `context`, which must be the context the
    /// sockets were created in.
    pub(crate) fn spawn(context: &Context, sockets: ProxySockets) -> Result<Self, TransportError> {
        let steer = context.socket(zmq::PAIR, "control")?;
        steer
            .bind(CONTROL_ENDPOINT)
            .map_err(|source| TransportError::Bind {
                endpoint: CONTROL_ENDPOINT.to_owned(),
                source,
            })?;
        let control = context.socket(zmq::PAIR, "control")?;
        control
            .connect(CONTROL_ENDPOINT)
            .map_err(|source| TransportError::Connect {
                endpoint: CONTROL_ENDPOINT.to_owned(),
                source,
            })?;
        let handle = thread::Builder::new()
            .name("broker-proxy".to_owned())
            .spawn(move || pump(sockets, steer))
            .map_err(|source| TransportError::Spawn {
                component: "proxy",
                source,
            })?;
        Ok(Self {
            control,
            handle: Some(handle),
        })
    }

    /// Asks the proxy to terminate.
    pub(crate) fn stop(&self) {
        if let Err(error) = self.control.send(TERMINATE, zmq::DONTWAIT) {
            debug!(target: PROXY_TARGET, error = %error, "proxy already stopped");
        }
    }

    /// Returns true once the proxy thread has exited.
    pub(crate) fn is_stopped(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stops the proxy and takes its sockets back.
    pub(crate) fn join(mut self) -> Result<ProxySockets, TransportError> {
        self.stop();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| TransportError::ThreadPanic { component: "proxy" })?,
            None => Err(TransportError::Closed),
        }
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop();
            let _outcome = handle.join();
        }
    }
}

fn pump(mut sockets: ProxySockets, mut steer: zmq::Socket) -> Result<ProxySockets, TransportError> {
    debug!(target: PROXY_TARGET, frontend = %sockets.frontend.endpoint(), "proxy started");
    let outcome = zmq::proxy_steerable(
        sockets.frontend.socket_mut(),
        sockets.backend.socket_mut(),
        &mut steer,
    );
    debug!(target: PROXY_TARGET, "proxy stopped");
    match outcome {
        Ok(()) | Err(zmq::Error::ETERM) => Ok(sockets),
        Err(source) => Err(TransportError::io("proxy", source)),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use broker_config::Endpoint;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::transport::{MessageTransport, RouterOptions, ZmqSocket};

    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        client: ZmqSocket,
        worker: ZmqSocket,
        proxy: Proxy,
    }

    #[fixture]
    fn harness() -> Harness {
        let context = Context::new();
        let frontend = context
            .bind_router(&Endpoint::tcp("127.0.0.1", 0), RouterOptions::default())
            .expect("router binds");
        let backend = context
            .bind_dealer(&Endpoint::inproc("backend"))
            .expect("dealer binds");
        let client = context
            .connect(frontend.endpoint(), b"client")
            .expect("client connects");
        let worker = context
            .connect(backend.endpoint(), b"worker")
            .expect("worker connects");
        let proxy = Proxy::spawn(&context, ProxySockets { frontend, backend }).expect("spawn proxy");
        Harness {
            client,
            worker,
            proxy,
        }
    }

    #[rstest]
    fn frames_cross_unchanged_in_both_directions(harness: Harness) {
        let request = vec![Vec::new(), b"{}".to_vec()];
        harness.client.send_multipart(request.clone()).expect("send");
        let delivered = harness
            .worker
            .recv_timeout(WAIT)
            .expect("recv")
            .expect("request forwarded");
        assert_eq!(
            delivered,
            vec![b"client".to_vec(), Vec::new(), b"{}".to_vec()]
        );

        harness.worker.send_multipart(delivered).expect("reply");
        assert_eq!(harness.client.recv_timeout(WAIT).expect("recv"), Some(request));

        harness.proxy.join().expect("join");
    }

    #[rstest]
    fn terminate_returns_the_sockets(harness: Harness) {
        harness.proxy.stop();
        let deadline = Instant::now() + WAIT;
        while !harness.proxy.is_stopped() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(harness.proxy.is_stopped());
        let sockets = harness.proxy.join().expect("join");
        assert_eq!(sockets.backend.endpoint(), &Endpoint::inproc("backend"));
    }
}
