//! Bridge builder and lifecycle.
//!
//! A [`Bridge`] owns everything mutable — sessions, in-flight request
//! tasks, per-peer pumps — behind one object with an explicit lifecycle,
//! so several independent bridges can coexist and teardown is
//! deterministic in tests. The surrounding BLE glue calls three
//! entry points from its stack callbacks:
//!
//! 1. [`Bridge::on_connect`] when a peer subscribes — registers the
//!    session and queues the welcome envelope
//! 2. [`Bridge::on_write`] for every raw characteristic write
//! 3. [`Bridge::on_disconnect`] when the peer goes away
//!
//! [`Bridge::shutdown`] stops accepting writes, cancels in-flight
//! request tasks and tears down every session's pump.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinSet;

use crate::backend::BackendApi;
use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{BridgeError, Result};
use crate::processor::RequestProcessor;
use crate::pump::{spawn_pump, PeerNotifier, PumpConfig};
use crate::session::{welcome_envelope, SessionId, SessionRegistry};

/// Builder for configuring and creating a [`Bridge`].
pub struct BridgeBuilder {
    config: BridgeConfig,
}

impl BridgeBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the maximum notification size, frame header included.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.config.mtu = mtu;
        self
    }

    /// Set the delay between successive frames of one envelope.
    pub fn frame_pacing(mut self, pacing: std::time::Duration) -> Self {
        self.config.frame_pacing = pacing;
        self
    }

    /// Set the capacity of each peer's outgoing envelope queue.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the bound on concurrently processed requests.
    pub fn max_concurrent_requests(mut self, limit: usize) -> Self {
        self.config.max_concurrent_requests = limit;
        self
    }

    /// Build the bridge around a backend collaborator.
    pub fn build<B: BackendApi>(self, backend: B) -> Bridge {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_requests));
        Bridge {
            processor: Arc::new(RequestProcessor::new(Arc::new(backend))),
            registry: SessionRegistry::new(),
            semaphore,
            tasks: Arc::new(AsyncMutex::new(JoinSet::new())),
            accepting: AtomicBool::new(true),
            config: self.config,
        }
    }
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running bridge instance.
pub struct Bridge {
    config: BridgeConfig,
    processor: Arc<RequestProcessor>,
    registry: SessionRegistry,
    /// Cap on concurrently processed requests, shared by all sessions.
    semaphore: Arc<Semaphore>,
    /// In-flight request tasks, cancelled on shutdown.
    tasks: Arc<AsyncMutex<JoinSet<()>>>,
    accepting: AtomicBool,
}

impl Bridge {
    /// Create a bridge builder.
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    /// Handle a new peer connection.
    ///
    /// Spawns the peer's pump around the given notifier, registers the
    /// session and queues the welcome envelope. Returns the session id
    /// the transport glue must pass to [`on_write`](Self::on_write) and
    /// [`on_disconnect`](Self::on_disconnect).
    pub async fn on_connect(&self, notifier: Arc<dyn PeerNotifier>) -> Result<SessionId> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(BridgeError::ConnectionClosed);
        }

        let (pump, pump_task) = spawn_pump(notifier, PumpConfig::from(&self.config));
        let dispatcher = Arc::new(Dispatcher::new(
            self.processor.clone(),
            pump.clone(),
            self.semaphore.clone(),
            self.tasks.clone(),
        ));
        let id = self.registry.register(dispatcher, pump_task);
        tracing::info!(session = %id, "client connected");

        pump.enqueue(welcome_envelope(&self.config))?;
        Ok(id)
    }

    /// Handle one raw write on the characteristic.
    ///
    /// Unknown sessions and writes after shutdown are logged and ignored;
    /// the transport callback never sees an error.
    pub async fn on_write(&self, id: SessionId, data: &[u8]) {
        if !self.accepting.load(Ordering::Acquire) {
            tracing::debug!(session = %id, "write ignored, bridge is shutting down");
            return;
        }
        match self.registry.get(id) {
            Some(session) => session.dispatcher.handle_write(data).await,
            None => tracing::warn!(session = %id, "write for unknown session"),
        }
    }

    /// Handle a peer disconnection.
    ///
    /// Envelopes still queued for the peer are dropped: delivery is
    /// best-effort and never spans a disconnect.
    pub async fn on_disconnect(&self, id: SessionId) {
        match self.registry.remove(id) {
            Some(session) => {
                session.pump_task.abort();
                let connected_ms = crate::envelope::now_ms() - session.connected_at;
                tracing::info!(session = %id, connected_ms, "client disconnected");
            }
            None => tracing::warn!(session = %id, "disconnect for unknown session"),
        }
    }

    /// Number of currently connected peers.
    pub fn connected_peers(&self) -> usize {
        self.registry.len()
    }

    /// Stop the bridge.
    ///
    /// Stops accepting connections and writes, cancels in-flight request
    /// tasks, and aborts every session's pump, discarding queued
    /// envelopes.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);

        let mut tasks = self.tasks.lock().await;
        tasks.shutdown().await;
        drop(tasks);

        for session in self.registry.drain() {
            session.pump_task.abort();
        }
        tracing::info!("bridge stopped");
    }
}
