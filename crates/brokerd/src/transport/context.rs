//! Owner of the ZeroMQ context a broker's sockets share.

use std::fmt;

use broker_config::Endpoint;
use tracing::debug;

use super::{RouterOptions, RouterSocket, TRANSPORT_TARGET, TransportError, ZmqSocket};

/// Send timeout for connected sockets; a DEALER with no peer would otherwise
/// block forever.
const SEND_TIMEOUT_MS: i32 = 1_000;

/// ZeroMQ context scoped to one broker.
///
/// `inproc://` endpoints are only visible to sockets of the same context, so
/// the back-end dealer and its workers must be created through one value.
/// The context terminates once it and every socket made from it are dropped.
#[derive(Clone, Default)]
pub struct Context {
    inner: zmq::Context,
}

impl fmt::Debug for Context {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Context").finish_non_exhaustive()
    }
}

impl Context {
    /// Creates a fresh context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a ROUTER to a TCP endpoint.
    pub fn bind_router(
        &self,
        endpoint: &Endpoint,
        options: RouterOptions,
    ) -> Result<RouterSocket, TransportError> {
        RouterSocket::bind(self, endpoint, options)
    }

    /// Binds a DEALER to an `inproc://` endpoint.
    pub fn bind_dealer(&self, endpoint: &Endpoint) -> Result<DealerSocket, TransportError> {
        if !matches!(endpoint, Endpoint::Inproc { .. }) {
            return Err(TransportError::UnsupportedEndpoint {
                endpoint: endpoint.to_string(),
            });
        }
        let socket = self.socket(zmq::DEALER, "dealer")?;
        let address = endpoint.to_string();
        socket.bind(&address).map_err(|source| TransportError::Bind {
            endpoint: address.clone(),
            source,
        })?;
        debug!(target: TRANSPORT_TARGET, endpoint = %address, "dealer bound");
        Ok(DealerSocket {
            socket,
            endpoint: endpoint.clone(),
        })
    }

    /// Connects a DEALER announcing `identity` to `endpoint`.
    ///
    /// Workers connect this way to the back-end; clients use it against a
    /// broker's TCP front-end.
    pub fn connect(&self, endpoint: &Endpoint, identity: &[u8]) -> Result<ZmqSocket, TransportError> {
        let socket = self.socket(zmq::DEALER, "dealer")?;
        if !identity.is_empty() {
            socket
                .set_identity(identity)
                .map_err(|source| configure("routing id", source))?;
        }
        socket
            .set_sndtimeo(SEND_TIMEOUT_MS)
            .map_err(|source| configure("send timeout", source))?;
        let address = endpoint.to_string();
        socket.connect(&address).map_err(|source| TransportError::Connect {
            endpoint: address.clone(),
            source,
        })?;
        Ok(ZmqSocket::new(address, socket))
    }

    /// Creates a socket with linger disabled so closing never waits on
    /// undelivered messages.
    pub(crate) fn socket(
        &self,
        kind: zmq::SocketType,
        label: &'static str,
    ) -> Result<zmq::Socket, TransportError> {
        let socket = self
            .inner
            .socket(kind)
            .map_err(|source| TransportError::Socket { kind: label, source })?;
        socket.set_linger(0).map_err(|source| TransportError::Configure {
            kind: label,
            option: "linger",
            source,
        })?;
        Ok(socket)
    }
}

fn configure(option: &'static str, source: zmq::Error) -> TransportError {
    TransportError::Configure {
        kind: "dealer",
        option,
        source,
    }
}

/// Back-end DEALER bound inside a broker's context.
pub struct DealerSocket {
    socket: zmq::Socket,
    endpoint: Endpoint,
}

impl DealerSocket {
    /// Endpoint the dealer is bound to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[cfg(test)]
    pub(crate) fn socket(&self) -> &zmq::Socket {
        &self.socket
    }

    pub(crate) fn socket_mut(&mut self) -> &mut zmq::Socket {
        &mut self.socket
    }
}

impl fmt::Debug for DealerSocket {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DealerSocket")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::MessageTransport;

    #[test]
    fn inproc_endpoint_binds_once() {
        let context = Context::new();
        let endpoint = Endpoint::inproc("backend");
        let _dealer = context.bind_dealer(&endpoint).expect("first bind");
        let error = context.bind_dealer(&endpoint).expect_err("second bind");
        assert!(matches!(
            error,
            TransportError::Bind {
                source: zmq::Error::EADDRINUSE,
                ..
            }
        ));
    }

    #[test]
    fn dealers_only_bind_in_process() {
        let context = Context::new();
        let error = context
            .bind_dealer(&Endpoint::tcp("127.0.0.1", 0))
            .expect_err("tcp dealer");
        assert!(matches!(error, TransportError::UnsupportedEndpoint { .. }));
    }

    #[test]
    fn inproc_names_are_private_to_a_context() {
        let owner = Context::new();
        let stranger = Context::new();
        let endpoint = Endpoint::inproc("backend");
        let dealer = owner.bind_dealer(&endpoint).expect("bind");
        dealer.socket().set_rcvtimeo(500).expect("receive timeout");

        let outsider = stranger.connect(&endpoint, b"outsider").expect("connect");
        outsider.send_multipart(vec![b"stray".to_vec()]).expect("queued");
        let insider = owner.connect(&endpoint, b"insider").expect("connect");
        insider.send_multipart(vec![b"hello".to_vec()]).expect("send");

        let received = dealer.socket().recv_multipart(0).expect("recv");
        assert_eq!(received, vec![b"hello".to_vec()]);
        assert_eq!(dealer.socket().recv_multipart(0), Err(zmq::Error::EAGAIN));
        assert!(
            insider
                .recv_timeout(Duration::from_millis(20))
                .expect("open")
                .is_none()
        );
    }
}
