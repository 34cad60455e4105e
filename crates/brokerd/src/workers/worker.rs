//! Worker receive loop.

use std::time::Duration;

use tracing::{debug, error, warn};

use super::WORKERS_TARGET;
use crate::protocol::ModelRegistry;
use crate::transport::{Frames, MessageTransport, TransportError, describe_identity};

/// Receives a worker's availability reports.
pub trait Liveness: Send + Sync {
    /// The worker is idle and can take a request.
    fn ready(&self, worker: &[u8]);

    /// The worker has picked up a request.
    fn busy(&self, worker: &[u8]);

    /// The worker is alive but has nothing to report.
    fn alive(&self, worker: &[u8]);
}

/// Serves requests arriving on `socket` until it closes.
///
/// A receive that times out after `heartbeat` is reported as a keepalive.
pub(crate) fn run_worker(
    socket: &dyn MessageTransport,
    identity: &[u8],
    liveness: &dyn Liveness,
    models: &ModelRegistry,
    heartbeat: Duration,
) {
    let worker = describe_identity(identity);
    debug!(target: WORKERS_TARGET, worker = %worker, "worker started");
    liveness.ready(identity);
    loop {
        match socket.recv_timeout(heartbeat) {
            Ok(Some(frames)) => {
                liveness.busy(identity);
                if let Some(reply) = answer(models, frames) {
                    match socket.send_multipart(reply) {
                        Ok(()) => {}
                        Err(error) if error.is_closed() => break,
                        Err(error) => {
                            warn!(target: WORKERS_TARGET, worker = %worker, error = %error, "failed to send reply");
                        }
                    }
                }
                liveness.ready(identity);
            }
            Ok(None) => liveness.alive(identity),
            Err(TransportError::Closed | TransportError::Terminated) => break,
            Err(error) => {
                warn!(target: WORKERS_TARGET, worker = %worker, error = %error, "worker receive failed");
                break;
            }
        }
    }
    debug!(target: WORKERS_TARGET, worker = %worker, "worker stopped");
}

/// Builds the reply for one request, keeping every frame but the payload as
/// the routing prefix.
fn answer(models: &ModelRegistry, mut frames: Frames) -> Option<Frames> {
    if frames.len() < 2 {
        warn!(
            target: WORKERS_TARGET,
            frames = frames.len(),
            "dropping request without a routing prefix"
        );
        return None;
    }
    let payload = frames.pop()?;
    let reply = models.handle(&payload);
    match reply.to_bytes() {
        Ok(bytes) => {
            frames.push(bytes);
            Some(frames)
        }
        Err(source) => {
            error!(target: WORKERS_TARGET, error = %source, "failed to encode reply");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::thread;

    use broker_types::Reply;
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;
    use crate::transport::MemoryTransport;

    const HEARTBEAT: Duration = Duration::from_millis(20);
    const WAIT: Duration = Duration::from_secs(2);

    #[derive(Debug, Default)]
    struct RecordingLiveness {
        events: Mutex<Vec<&'static str>>,
    }

    impl RecordingLiveness {
        fn events(&self) -> Vec<&'static str> {
            self.events.lock().expect("events lock").clone()
        }
    }

    impl Liveness for RecordingLiveness {
        fn ready(&self, _worker: &[u8]) {
            self.events.lock().expect("events lock").push("ready");
        }

        fn busy(&self, _worker: &[u8]) {
            self.events.lock().expect("events lock").push("busy");
        }

        fn alive(&self, _worker: &[u8]) {
            self.events.lock().expect("events lock").push("alive");
        }
    }

    #[fixture]
    fn models() -> ModelRegistry {
        ModelRegistry::with_builtins()
    }

    fn serve(
        models: ModelRegistry,
        liveness: &RecordingLiveness,
        drive: impl FnOnce(&MemoryTransport),
    ) {
        let (dealer_end, worker_end) = MemoryTransport::pair("worker");
        thread::scope(|scope| {
            scope.spawn(|| run_worker(&worker_end, b"worker-0", liveness, &models, HEARTBEAT));
            drive(&dealer_end);
            worker_end.close();
        });
    }

    fn reply_of(frames: &Frames) -> Reply {
        Reply::from_slice(frames.last().expect("payload frame")).expect("reply json")
    }

    #[rstest]
    fn ping_reply_keeps_the_routing_prefix(models: ModelRegistry) {
        let liveness = RecordingLiveness::default();
        serve(models, &liveness, |dealer| {
            dealer
                .send_multipart(vec![b"client".to_vec(), Vec::new(), br#"{"type":"ping"}"#.to_vec()])
                .expect("send");
            let frames = dealer.recv_timeout(WAIT).expect("recv").expect("reply");
            assert_eq!(frames.first(), Some(&b"client".to_vec()));
            assert_eq!(frames.get(1), Some(&Vec::new()));
            assert_eq!(reply_of(&frames), Reply::new("ping", json!({ "ping": "pong" })));
        });
        let transitions: Vec<&str> = liveness
            .events()
            .into_iter()
            .filter(|event| *event != "alive")
            .collect();
        assert_eq!(transitions, ["ready", "busy", "ready"]);
    }

    #[rstest]
    fn prefix_without_delimiter_is_preserved(models: ModelRegistry) {
        let liveness = RecordingLiveness::default();
        serve(models, &liveness, |dealer| {
            dealer
                .send_multipart(vec![b"client".to_vec(), br#"{"type":"ping"}"#.to_vec()])
                .expect("send");
            let frames = dealer.recv_timeout(WAIT).expect("recv").expect("reply");
            assert_eq!(frames.len(), 2);
            assert_eq!(frames.first(), Some(&b"client".to_vec()));
        });
    }

    #[rstest]
    fn malformed_json_gets_an_error_reply(models: ModelRegistry) {
        let liveness = RecordingLiveness::default();
        serve(models, &liveness, |dealer| {
            dealer
                .send_multipart(vec![b"client".to_vec(), b"{not json".to_vec()])
                .expect("send");
            let frames = dealer.recv_timeout(WAIT).expect("recv").expect("reply");
            let body = reply_of(&frames).error_body().expect("error body");
            assert_eq!(body.kind, "DecodeEnvelope");
        });
    }

    #[rstest]
    fn single_frame_messages_are_dropped(models: ModelRegistry) {
        let liveness = RecordingLiveness::default();
        serve(models, &liveness, |dealer| {
            dealer
                .send_multipart(vec![br#"{"type":"ping"}"#.to_vec()])
                .expect("send");
            let nothing = dealer.recv_timeout(Duration::from_millis(100)).expect("recv");
            assert_eq!(nothing, None);
        });
    }

    #[rstest]
    fn idle_workers_send_keepalives(models: ModelRegistry) {
        let liveness = RecordingLiveness::default();
        serve(models, &liveness, |_| thread::sleep(HEARTBEAT * 5));
        assert!(liveness.events().contains(&"alive"));
    }
}
