//! Inbound write dispatching.
//!
//! Invoked once per raw write observed on the characteristic. The
//! dispatcher reassembles frames, decodes the completed envelope,
//! synthesizes status-400 error envelopes for anything malformed, and
//! hands valid requests to the processor as independently spawned units
//! of work — a slow backend call never blocks reception of subsequent
//! writes, which also means responses may be enqueued out of request
//! order. Peers correlate by id, not position.
//!
//! In-flight work is bounded: a semaphore caps concurrent requests (at
//! capacity the request is dropped with a warning) and every task lives
//! in a `JoinSet` so shutdown can cancel the lot deterministically.

use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinSet;

use crate::envelope::{self, Envelope};
use crate::error::BridgeError;
use crate::processor::RequestProcessor;
use crate::protocol::Reassembler;
use crate::pump::PumpHandle;

/// Per-session inbound dispatcher.
pub(crate) struct Dispatcher {
    processor: Arc<RequestProcessor>,
    pump: PumpHandle,
    /// One partially received envelope at most, per the framing contract.
    reassembler: AsyncMutex<Reassembler>,
    /// Bridge-wide cap on concurrently processed requests.
    semaphore: Arc<Semaphore>,
    /// Bridge-wide set of in-flight processor tasks.
    tasks: Arc<AsyncMutex<JoinSet<()>>>,
}

impl Dispatcher {
    pub fn new(
        processor: Arc<RequestProcessor>,
        pump: PumpHandle,
        semaphore: Arc<Semaphore>,
        tasks: Arc<AsyncMutex<JoinSet<()>>>,
    ) -> Self {
        Self {
            processor,
            pump,
            reassembler: AsyncMutex::new(Reassembler::new()),
            semaphore,
            tasks,
        }
    }

    /// Handle one raw write from the peer.
    ///
    /// Never returns an error to the transport: every failure mode is
    /// reported to the peer as an `error` envelope or logged and dropped.
    pub async fn handle_write(&self, data: &[u8]) {
        let complete = {
            let mut reassembler = self.reassembler.lock().await;
            match reassembler.push(data) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping broken frame sequence");
                    self.send_error(None, None, format!("{}", e), 400);
                    return;
                }
            }
        };

        let envelope = match envelope::decode(&complete) {
            Ok(envelope) => envelope,
            Err(BridgeError::Decode(e)) => {
                tracing::error!(error = %e, "received invalid JSON");
                self.send_error(None, None, "Invalid JSON format", 400);
                return;
            }
            Err(e) => {
                // Valid JSON, invalid envelope: address the error with
                // whatever id/endpoint the message did carry.
                tracing::warn!(error = %e, "received invalid envelope");
                let id = envelope::peek_id(&complete);
                let endpoint = envelope::peek_endpoint(&complete);
                self.send_error(id, endpoint, format!("{}", e), 400);
                return;
            }
        };

        if !envelope.is_request() {
            tracing::warn!(
                id = %envelope.id,
                kind = envelope.body.type_name(),
                "discarding non-request envelope from peer"
            );
            return;
        }

        tracing::debug!(id = %envelope.id, endpoint = ?envelope.endpoint, "received request");
        self.spawn_request(envelope).await;
    }

    /// Spawn the processing of one validated request.
    async fn spawn_request(&self, envelope: Envelope) {
        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!(
                    id = %envelope.id,
                    "request capacity reached, dropping request"
                );
                return;
            }
        };

        let processor = self.processor.clone();
        let pump = self.pump.clone();

        let mut tasks = self.tasks.lock().await;
        // Reap whatever already finished so the set stays small.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let _permit = permit;
            processor.process(envelope, &pump).await;
        });
    }

    fn send_error(
        &self,
        id: Option<String>,
        endpoint: Option<String>,
        message: impl Into<String>,
        status: u16,
    ) {
        let envelope = Envelope::error(id, endpoint, message, status);
        if let Err(e) = self.pump.enqueue(envelope) {
            tracing::warn!(error = %e, "could not queue error envelope");
        }
    }
}
