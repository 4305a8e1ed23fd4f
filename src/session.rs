//! Session registry.
//!
//! Tracks connected peers for the lifetime of their connection: created on
//! connect (together with the peer's pump and dispatcher), removed on
//! disconnect, never persisted. Each session is an independent
//! conversation with its own outgoing queue and reassembly state.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::task::JoinHandle;

use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::envelope::{Envelope, PROTOCOL_VERSION};

/// Opaque identifier of one peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// One active peer connection.
pub(crate) struct Session {
    /// Milliseconds since epoch at connect time.
    pub connected_at: i64,
    /// This peer's inbound dispatcher, which holds the pump handle.
    pub dispatcher: Arc<Dispatcher>,
    /// The pump task, aborted on disconnect so queued envelopes are
    /// dropped rather than delivered to a gone peer.
    pub pump_task: JoinHandle<()>,
}

/// Registry of connected peers.
pub(crate) struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    counter: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Record a new session and allocate its id.
    pub fn register(&self, dispatcher: Arc<Dispatcher>, pump_task: JoinHandle<()>) -> SessionId {
        let id = SessionId(self.counter.fetch_add(1, Ordering::Relaxed) + 1);
        let session = Arc::new(Session {
            connected_at: crate::envelope::now_ms(),
            dispatcher,
            pump_task,
        });
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .insert(id, session);
        tracing::debug!(session = %id, "session registered");
        id
    }

    /// Look up a session by id.
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .get(&id)
            .cloned()
    }

    /// Remove a session, returning it for teardown.
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .remove(&id)
    }

    /// Remove every session, for bridge shutdown.
    pub fn drain(&self) -> Vec<Arc<Session>> {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .drain()
            .map(|(_, s)| s)
            .collect()
    }

    /// Number of connected peers.
    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session lock poisoned").len()
    }
}

/// Build the `system` welcome envelope sent to a freshly connected peer.
pub(crate) fn welcome_envelope(config: &BridgeConfig) -> Envelope {
    Envelope::system(json!({
        "message": "Connected to POS Bluetooth Proxy",
        "protocolVersion": PROTOCOL_VERSION,
        "deviceInfo": {
            "name": config.device_name,
            "serviceUUID": config.service_uuid,
            "characteristicUUID": config.characteristic_uuid,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ApiOutcome, BackendApi};
    use crate::envelope::{Body, Method};
    use crate::error::Result;
    use crate::processor::RequestProcessor;
    use crate::pump;
    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::{Mutex as AsyncMutex, Semaphore};
    use tokio::task::JoinSet;

    struct NullBackend;

    #[async_trait]
    impl BackendApi for NullBackend {
        async fn call(&self, _: Method, _: &str, _: Option<Value>) -> Result<ApiOutcome> {
            Ok(ApiOutcome::ok(Value::Null, 200))
        }
    }

    fn make_session() -> (Arc<Dispatcher>, JoinHandle<()>) {
        let (pump, _rx) = pump::test_handle(4);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(RequestProcessor::new(Arc::new(NullBackend))),
            pump,
            Arc::new(Semaphore::new(1)),
            Arc::new(AsyncMutex::new(JoinSet::new())),
        ));
        let task = tokio::spawn(async {});
        (dispatcher, task)
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_increasing() {
        let registry = SessionRegistry::new();
        let (dispatcher, task) = make_session();
        let a = registry.register(dispatcher, task);
        let (dispatcher, task) = make_session();
        let b = registry.register(dispatcher, task);

        assert_ne!(a, b);
        assert_eq!(a.to_string(), "client-1");
        assert_eq!(b.to_string(), "client-2");
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_drops_session() {
        let registry = SessionRegistry::new();
        let (dispatcher, task) = make_session();
        let id = registry.register(dispatcher, task);

        assert!(registry.get(id).is_some());
        assert!(registry.remove(id).is_some());
        assert!(registry.get(id).is_none());
        assert!(registry.remove(id).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_drain_empties_registry() {
        let registry = SessionRegistry::new();
        for _ in 0..3 {
            let (dispatcher, task) = make_session();
            registry.register(dispatcher, task);
        }

        let drained = registry.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_welcome_envelope_shape() {
        let config = BridgeConfig::default();
        let envelope = welcome_envelope(&config);

        assert!(!envelope.id.is_empty());
        assert_eq!(envelope.endpoint.as_deref(), Some("/"));
        match envelope.body {
            Body::System(payload) => {
                assert_eq!(payload["protocolVersion"], PROTOCOL_VERSION);
                assert_eq!(payload["deviceInfo"]["name"], config.device_name);
                assert_eq!(payload["deviceInfo"]["serviceUUID"], config.service_uuid);
                assert_eq!(
                    payload["deviceInfo"]["characteristicUUID"],
                    config.characteristic_uuid
                );
            }
            other => panic!("expected system, got {:?}", other),
        }
    }
}
