//! Multipart message transport for the broker, built on ZeroMQ.
//!
//! The front-end is a ROUTER bound over TCP, which prefixes every inbound
//! message with the routing identity of its sender and routes outbound
//! messages by that leading frame. The back-end is a DEALER bound to an
//! `inproc://` endpoint; the worker threads connect to it with DEALER sockets
//! of their own. Worker sockets and the in-memory pair used in tests share
//! the [`MessageTransport`] capability.

mod context;
mod errors;
mod memory;
mod router;
mod socket;

use std::time::Duration;

pub use self::context::{Context, DealerSocket};
pub use self::errors::TransportError;
pub use self::memory::MemoryTransport;
pub use self::router::{RouterOptions, RouterSocket};
pub use self::socket::ZmqSocket;

/// Ordered frames making up one multipart message.
pub type Frames = Vec<Vec<u8>>;

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Poll granularity used by blocking receives so closes are noticed promptly.
pub(crate) const RECV_POLL: Duration = Duration::from_millis(25);

/// Largest frame a peer may send to the front-end.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Most frames a received message may carry.
pub const MAX_MESSAGE_FRAMES: usize = 32;

/// Minimal capability shared by every broker socket.
///
/// Binding is performed by the concrete constructors ([`Context::connect`],
/// [`MemoryTransport::pair`]); once bound, sockets are driven only through
/// this trait.
pub trait MessageTransport: Send + Sync {
    /// Address this socket is bound or connected to.
    fn endpoint(&self) -> String;

    /// Waits up to `timeout` for the next message.
    ///
    /// Returns `Ok(None)` on timeout and [`TransportError::Closed`] once the
    /// socket has been closed.
    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Frames>, TransportError>;

    /// Blocks until the next message arrives or the socket closes.
    fn recv_multipart(&self) -> Result<Frames, TransportError> {
        loop {
            if let Some(frames) = self.recv_timeout(RECV_POLL)? {
                return Ok(frames);
            }
        }
    }

    /// Sends all frames of one message together.
    fn send_multipart(&self, frames: Frames) -> Result<(), TransportError>;

    /// Closes the socket, unblocking pending receives.
    fn close(&self);

    /// Returns true once [`MessageTransport::close`] has run.
    fn is_closed(&self) -> bool;
}

/// Renders a routing identity for logs.
///
/// Printable ASCII identities are shown verbatim; anything else is hex.
pub fn describe_identity(identity: &[u8]) -> String {
    if !identity.is_empty() && identity.iter().all(u8::is_ascii_graphic) {
        return String::from_utf8_lossy(identity).into_owned();
    }
    let mut rendered = String::with_capacity(2 + identity.len() * 2);
    rendered.push_str("0x");
    for byte in identity {
        rendered.push_str(&format!("{byte:02x}"));
    }
    rendered
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::describe_identity;

    #[rstest]
    #[case(b"client-a".as_slice(), "client-a")]
    #[case(&[0x00, 0x00, 0x00, 0x00, 0x2a], "0x000000002a")]
    #[case(b"", "0x")]
    fn identities_render_for_logs(#[case] identity: &[u8], #[case] expected: &str) {
        assert_eq!(describe_identity(identity), expected);
    }
}
