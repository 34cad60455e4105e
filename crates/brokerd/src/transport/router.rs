//! Client-facing ROUTER socket over TCP.
//!
//! The ROUTER prefixes every inbound message with the routing identity of
//! its sender and routes outbound messages by their first frame. Peers that
//! do not announce an identity are given a generated one.

use std::fmt;

use broker_config::Endpoint;
use tracing::info;

use super::{Context, MAX_FRAME_BYTES, TRANSPORT_TARGET, TransportError};

/// Routing behaviour of a [`RouterSocket`].
///
/// Both flags default to off, which is also ZeroMQ's default: unroutable
/// replies are dropped and a second peer claiming an identity in use is
/// refused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterOptions {
    /// Fail sends to unknown identities with `EHOSTUNREACH` instead of
    /// dropping them.
    pub mandatory: bool,
    /// Let a new connection take over an identity already in use.
    pub handover: bool,
}

/// TCP ROUTER socket bound by a broker.
pub struct RouterSocket {
    socket: zmq::Socket,
    endpoint: Endpoint,
    port: u16,
}

impl RouterSocket {
    pub(super) fn bind(
        context: &Context,
        endpoint: &Endpoint,
        options: RouterOptions,
    ) -> Result<Self, TransportError> {
        let Endpoint::Tcp { host, port } = endpoint else {
            return Err(TransportError::UnsupportedEndpoint {
                endpoint: endpoint.to_string(),
            });
        };
        let socket = context.socket(zmq::ROUTER, "router")?;
        socket
            .set_router_mandatory(options.mandatory)
            .map_err(|source| configure("router mandatory", source))?;
        socket
            .set_router_handover(options.handover)
            .map_err(|source| configure("router handover", source))?;
        socket
            .set_maxmsgsize(i64::try_from(MAX_FRAME_BYTES).unwrap_or(i64::MAX))
            .map_err(|source| configure("max message size", source))?;

        let address = if *port == 0 {
            format!("tcp://{host}:*")
        } else {
            endpoint.to_string()
        };
        socket.bind(&address).map_err(|source| TransportError::Bind {
            endpoint: address.clone(),
            source,
        })?;
        let bound = bound_endpoint(&socket)?;
        let Endpoint::Tcp { port, .. } = bound else {
            return Err(TransportError::BoundEndpoint {
                reported: bound.to_string(),
            });
        };
        info!(
            target: TRANSPORT_TARGET,
            endpoint = %bound,
            mandatory = options.mandatory,
            handover = options.handover,
            "router bound"
        );
        Ok(Self {
            socket,
            endpoint: bound,
            port,
        })
    }

    /// Endpoint actually bound, with any ephemeral port resolved.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// TCP port the router listens on.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[cfg(test)]
    pub(crate) fn socket(&self) -> &zmq::Socket {
        &self.socket
    }

    pub(crate) fn socket_mut(&mut self) -> &mut zmq::Socket {
        &mut self.socket
    }
}

impl fmt::Debug for RouterSocket {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RouterSocket")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

fn configure(option: &'static str, source: zmq::Error) -> TransportError {
    TransportError::Configure {
        kind: "router",
        option,
        source,
    }
}

fn bound_endpoint(socket: &zmq::Socket) -> Result<Endpoint, TransportError> {
    let reported = socket
        .get_last_endpoint()
        .map_err(|source| TransportError::io("last endpoint", source))?
        .map_err(|raw| TransportError::BoundEndpoint {
            reported: String::from_utf8_lossy(&raw).into_owned(),
        })?;
    reported
        .parse()
        .map_err(|_| TransportError::BoundEndpoint { reported })
}
