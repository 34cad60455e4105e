//! Connected ZeroMQ socket driven through [`MessageTransport`].

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

use super::{
    Frames, MAX_FRAME_BYTES, MAX_MESSAGE_FRAMES, MessageTransport, RECV_POLL, TRANSPORT_TARGET,
    TransportError,
};
use crate::sync::lock;

/// A connected socket shared between threads.
///
/// ZeroMQ sockets may not be used from two threads at once, so every
/// operation runs under a mutex. Receives poll in short slices so that
/// [`MessageTransport::close`] takes effect promptly.
pub struct ZmqSocket {
    endpoint: String,
    socket: Mutex<zmq::Socket>,
    closed: AtomicBool,
}

impl ZmqSocket {
    pub(crate) fn new(endpoint: String, socket: zmq::Socket) -> Self {
        Self {
            endpoint,
            socket: Mutex::new(socket),
            closed: AtomicBool::new(false),
        }
    }

    /// Sends one request payload and waits for the reply payload.
    ///
    /// The request travels as `[empty delimiter, payload]`, the shape a REQ
    /// peer would produce; the last frame of the reply is returned.
    /// `Ok(None)` means no reply arrived in time.
    pub fn request(
        &self,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        self.send_multipart(vec![Vec::new(), payload.to_vec()])?;
        Ok(self
            .recv_timeout(timeout)?
            .and_then(|mut frames| frames.pop()))
    }
}

impl fmt::Debug for ZmqSocket {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ZmqSocket")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl MessageTransport for ZmqSocket {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Frames>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let socket = lock(&self.socket);
            let ready = socket
                .poll(zmq::POLLIN, poll_millis(remaining.min(RECV_POLL)))
                .map_err(|source| TransportError::io("poll", source))?;
            if ready > 0 {
                return read_message(&socket).map(Some);
            }
            drop(socket);
            if remaining.is_zero() {
                return Ok(None);
            }
        }
    }

    fn send_multipart(&self, frames: Frames) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if frames.is_empty() {
            return Err(TransportError::EmptyMessage);
        }
        lock(&self.socket)
            .send_multipart(frames, 0)
            .map_err(|source| TransportError::io("send", source))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, "socket closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn poll_millis(slice: Duration) -> i64 {
    i64::try_from(slice.as_millis()).unwrap_or(i64::MAX)
}

/// Reads every frame of the message at the head of the socket.
///
/// Messages with too many frames, or with a frame above
/// [`MAX_FRAME_BYTES`], are drained and reported as
/// [`TransportError::Oversized`] so the socket stays usable.
fn read_message(socket: &zmq::Socket) -> Result<Frames, TransportError> {
    let mut frames = Frames::new();
    let mut count = 0_usize;
    let mut bytes = 0_usize;
    let mut oversized = false;
    loop {
        let frame = socket
            .recv_bytes(0)
            .map_err(|source| TransportError::io("recv", source))?;
        count += 1;
        bytes = bytes.saturating_add(frame.len());
        oversized |= count > MAX_MESSAGE_FRAMES || frame.len() > MAX_FRAME_BYTES;
        if !oversized {
            frames.push(frame);
        }
        let more = socket
            .get_rcvmore()
            .map_err(|source| TransportError::io("recv", source))?;
        if !more {
            break;
        }
    }
    if oversized {
        debug!(target: TRANSPORT_TARGET, frames = count, bytes, "discarded oversized message");
        return Err(TransportError::Oversized {
            frames: count,
            bytes,
        });
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use broker_config::Endpoint;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::transport::{Context, DealerSocket};

    const WAIT: Duration = Duration::from_secs(2);

    struct Pair {
        _context: Context,
        dealer: DealerSocket,
        left: ZmqSocket,
        right: ZmqSocket,
    }

    /// Two worker sockets behind one dealer that relays between them.
    #[fixture]
    fn pair() -> Pair {
        let context = Context::new();
        let endpoint = Endpoint::inproc("socket-tests");
        let dealer = context.bind_dealer(&endpoint).expect("bind");
        let left = context.connect(&endpoint, b"left").expect("connect left");
        let right = context.connect(&endpoint, b"right").expect("connect right");
        Pair {
            _context: context,
            dealer,
            left,
            right,
        }
    }

    fn relay(pair: &Pair, frames: Frames) -> Result<Option<Frames>, TransportError> {
        pair.left.send_multipart(frames).expect("send");
        let raw = pair.dealer.socket();
        let relayed = raw.recv_multipart(0).expect("dealer recv");
        raw.send_multipart(relayed, 0).expect("dealer send");
        // The dealer round-robins, so drain whichever worker got it.
        match pair.right.recv_timeout(Duration::from_millis(200))? {
            Some(frames) => Ok(Some(frames)),
            None => pair.left.recv_timeout(WAIT),
        }
    }

    #[rstest]
    fn frames_of_a_message_arrive_together(pair: Pair) {
        let message = vec![b"client".to_vec(), Vec::new(), b"payload".to_vec()];
        assert_eq!(relay(&pair, message.clone()).expect("recv"), Some(message));
    }

    #[rstest]
    fn messages_with_too_many_frames_are_discarded(pair: Pair) {
        let flood: Frames = (0..=MAX_MESSAGE_FRAMES).map(|_| b"x".to_vec()).collect();
        let error = relay(&pair, flood).expect_err("too many frames");
        assert!(matches!(
            error,
            TransportError::Oversized { frames, .. } if frames == MAX_MESSAGE_FRAMES + 1
        ));

        let follow_up = vec![b"client".to_vec(), b"next".to_vec()];
        assert_eq!(relay(&pair, follow_up.clone()).expect("recv"), Some(follow_up));
    }

    #[rstest]
    fn timeout_yields_none(pair: Pair) {
        let received = pair
            .left
            .recv_timeout(Duration::from_millis(30))
            .expect("open socket");
        assert_eq!(received, None);
    }

    #[rstest]
    fn closed_sockets_refuse_work(pair: Pair) {
        pair.left.close();
        assert!(pair.left.recv_timeout(WAIT).expect_err("closed").is_closed());
        assert!(pair.left.send_multipart(vec![b"x".to_vec()]).is_err());
        assert!(matches!(
            pair.right.send_multipart(Vec::new()),
            Err(TransportError::EmptyMessage)
        ));
    }
}
