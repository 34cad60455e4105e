//! Typed control channel for a running broker.
//!
//! Every [`ControlCommand`] travels with its own reply channel, so callers on
//! any thread get exactly the answer to the command they sent.

use std::sync::mpsc::{self, Receiver, Sender};

use broker_config::Endpoint;
use broker_types::InstanceRecord;
use thiserror::Error;

use crate::ledger::LedgerSnapshot;

/// Commands a running broker answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Stop serving control requests so the owner can shut down.
    Close,
    /// Report the bound front-end endpoint.
    Endpoint,
    /// List the brokers advertised in the registry.
    Peers,
    /// Copy the heartbeat ledger.
    Ledger,
}

/// Answer to a [`ControlCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    /// The broker is about to shut down.
    Closing,
    /// Bound front-end endpoint.
    Endpoint(Endpoint),
    /// Advertised brokers, sorted by name.
    Peers(Vec<InstanceRecord>),
    /// Ledger contents.
    Ledger(LedgerSnapshot),
    /// The command could not be answered.
    Failed(String),
}

/// Errors raised by [`ControlHandle::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlError {
    /// Nobody is serving the channel any more.
    #[error("control channel is closed")]
    Disconnected,
}

#[derive(Debug)]
pub(crate) struct ControlRequest {
    pub(crate) command: ControlCommand,
    pub(crate) reply: Sender<ControlReply>,
}

/// Sending half of a control channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    sender: Sender<ControlRequest>,
}

impl ControlHandle {
    /// Sends `command` and waits for its reply.
    pub fn request(&self, command: ControlCommand) -> Result<ControlReply, ControlError> {
        let (reply, answer) = mpsc::channel();
        self.sender
            .send(ControlRequest { command, reply })
            .map_err(|_| ControlError::Disconnected)?;
        answer.recv().map_err(|_| ControlError::Disconnected)
    }
}

/// Receiving half of a control channel.
#[derive(Debug)]
pub struct ControlChannel {
    receiver: Receiver<ControlRequest>,
}

impl ControlChannel {
    /// Waits for the next request; `None` once every handle is gone.
    pub(crate) fn next(&self) -> Option<ControlRequest> {
        self.receiver.recv().ok()
    }
}

/// Creates a connected handle and channel.
#[must_use]
pub fn control_channel() -> (ControlHandle, ControlChannel) {
    let (sender, receiver) = mpsc::channel();
    (ControlHandle { sender }, ControlChannel { receiver })
}
