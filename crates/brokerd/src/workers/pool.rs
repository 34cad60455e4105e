//! Spawning and joining worker threads.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use broker_config::Endpoint;

use super::{Liveness, run_worker};
use crate::protocol::ModelRegistry;
use crate::transport::{Context, MessageTransport, TransportError, ZmqSocket};

/// Size and heartbeat of a worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PoolSettings {
    pub(crate) workers: usize,
    pub(crate) heartbeat: Duration,
}

/// Running worker threads.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    sockets: Vec<Arc<ZmqSocket>>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Connects `settings.workers` sockets to `endpoint` and starts a thread
    /// for each.
    pub(crate) fn spawn(
        context: &Context,
        endpoint: &Endpoint,
        settings: PoolSettings,
        models: &Arc<ModelRegistry>,
        liveness: &Arc<dyn Liveness>,
    ) -> Result<Self, TransportError> {
        let mut pool = Self {
            sockets: Vec::with_capacity(settings.workers),
            threads: Vec::with_capacity(settings.workers),
        };
        for index in 0..settings.workers {
            if let Err(error) = pool.start_one(context, endpoint, index, settings.heartbeat, models, liveness) {
                pool.close();
                let _joined = pool.join();
                return Err(error);
            }
        }
        Ok(pool)
    }

    fn start_one(
        &mut self,
        context: &Context,
        endpoint: &Endpoint,
        index: usize,
        heartbeat: Duration,
        models: &Arc<ModelRegistry>,
        liveness: &Arc<dyn Liveness>,
    ) -> Result<(), TransportError> {
        let identity = format!("worker-{index}").into_bytes();
        let socket = Arc::new(context.connect(endpoint, &identity)?);
        let thread_socket = Arc::clone(&socket);
        let thread_models = Arc::clone(models);
        let thread_liveness = Arc::clone(liveness);
        let handle = thread::Builder::new()
            .name(format!("broker-worker-{index}"))
            .spawn(move || {
                run_worker(
                    thread_socket.as_ref(),
                    &identity,
                    thread_liveness.as_ref(),
                    &thread_models,
                    heartbeat,
                );
            })
            .map_err(|source| TransportError::Spawn {
                component: "worker",
                source,
            })?;
        self.sockets.push(socket);
        self.threads.push(handle);
        Ok(())
    }

    /// Number of worker threads.
    pub(crate) fn len(&self) -> usize {
        self.threads.len()
    }

    /// Closes every worker socket.
    pub(crate) fn close(&self) {
        for socket in &self.sockets {
            socket.close();
        }
    }

    /// Waits for every worker thread to finish.
    pub(crate) fn join(self) -> Result<(), TransportError> {
        let mut panicked = false;
        for handle in self.threads {
            panicked |= handle.join().is_err();
        }
        if panicked {
            return Err(TransportError::ThreadPanic { component: "worker" });
        }
        Ok(())
    }
}
