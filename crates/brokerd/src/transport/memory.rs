//! In-memory transport pair for exercising socket consumers without I/O.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use super::{Frames, MessageTransport, TransportError};
use crate::sync::lock;

/// One end of a connected in-memory pair.
#[derive(Debug)]
pub struct MemoryTransport {
    name: String,
    inbox: Mutex<Receiver<Frames>>,
    peer: Sender<Frames>,
    closed: AtomicBool,
}

impl MemoryTransport {
    /// Creates two connected ends; what one sends the other receives.
    #[must_use]
    pub fn pair(name: &str) -> (Self, Self) {
        let (to_left, left_inbox) = mpsc::channel();
        let (to_right, right_inbox) = mpsc::channel();
        let end = |side: &str, inbox, peer| Self {
            name: format!("memory://{name}/{side}"),
            inbox: Mutex::new(inbox),
            peer,
            closed: AtomicBool::new(false),
        };
        (end("left", left_inbox, to_right), end("right", right_inbox, to_left))
    }
}

impl MessageTransport for MemoryTransport {
    fn endpoint(&self) -> String {
        self.name.clone()
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Frames>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        match lock(&self.inbox).recv_timeout(timeout) {
            Ok(frames) => Ok(Some(frames)),
            Err(RecvTimeoutError::Timeout) if self.is_closed() => Err(TransportError::Closed),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                self.close();
                Err(TransportError::Closed)
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
        self.peer.send(frames).map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_cross_the_pair() {
        let (left, right) = MemoryTransport::pair("unit");
        left.send_multipart(vec![b"a".to_vec(), b"b".to_vec()])
            .expect("send");
        assert_eq!(
            right.recv_multipart().expect("recv"),
            vec![b"a".to_vec(), b"b".to_vec()]
        );
        assert_eq!(
            right.recv_timeout(Duration::from_millis(5)).expect("open"),
            None
        );
    }

    #[test]
    fn dropping_one_end_closes_the_other() {
        let (left, right) = MemoryTransport::pair("unit");
        drop(left);
        assert!(right.recv_multipart().expect_err("peer gone").is_closed());
        assert!(right.send_multipart(vec![b"x".to_vec()]).is_err());
    }
}
