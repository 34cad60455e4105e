//! Error types for broker transport operations.

use std::io;

use thiserror::Error;

/// Errors surfaced while binding, connecting, or driving broker sockets.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to create {kind} socket: {source}")]
    Socket {
        kind: &'static str,
        #[source]
        source: zmq::Error,
    },
    #[error("failed to set {option} on {kind} socket: {source}")]
    Configure {
        kind: &'static str,
        option: &'static str,
        #[source]
        source: zmq::Error,
    },
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: zmq::Error,
    },
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: zmq::Error,
    },
    #[error("bound endpoint '{reported}' could not be read back")]
    BoundEndpoint { reported: String },
    #[error("endpoint {endpoint} is not supported by this socket type")]
    UnsupportedEndpoint { endpoint: String },
    #[error("failed to spawn {component} thread: {source}")]
    Spawn {
        component: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("no route to peer")]
    HostUnreachable,
    #[error("message has no frames to deliver")]
    EmptyMessage,
    #[error("message of {frames} frames and {bytes} bytes exceeds the receive limit")]
    Oversized { frames: usize, bytes: usize },
    #[error("socket closed")]
    Closed,
    #[error("transport context terminated")]
    Terminated,
    #[error("{operation} failed: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: zmq::Error,
    },
    #[error("{component} thread panicked")]
    ThreadPanic { component: &'static str },
}

impl TransportError {
    /// Returns true when the error only reports that the socket has shut down.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed | Self::Terminated)
    }

    /// Classifies a failed send or receive.
    pub(crate) fn io(operation: &'static str, source: zmq::Error) -> Self {
        match source {
            zmq::Error::ETERM => Self::Terminated,
            zmq::Error::EHOSTUNREACH => Self::HostUnreachable,
            source => Self::Io { operation, source },
        }
    }
}
