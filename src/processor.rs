//! Request processing.
//!
//! Maps one validated request envelope to one backend call and the
//! resulting `response` (or `error`) envelope, correlated by the request's
//! id. Backend failures of any kind still produce exactly one outgoing
//! envelope: HTTP-level and connectivity failures ride in the response
//! payload's `error`/`status` fields, faults outside the collaborator's
//! contract become a status-500 `error` envelope. Retry policy, if any,
//! lives in the backend collaborator.

use std::sync::Arc;

use crate::backend::BackendApi;
use crate::envelope::{Body, Envelope, ResponsePayload};
use crate::error::BridgeError;
use crate::pump::PumpHandle;

/// Turns request envelopes into backend calls and response envelopes.
pub(crate) struct RequestProcessor {
    backend: Arc<dyn BackendApi>,
}

impl RequestProcessor {
    pub fn new(backend: Arc<dyn BackendApi>) -> Self {
        Self { backend }
    }

    /// Process one request envelope and enqueue the outcome.
    ///
    /// The envelope must already have passed decode validation; the
    /// dispatcher guarantees it is a `request` with id and endpoint set.
    pub async fn process(&self, envelope: Envelope, pump: &PumpHandle) {
        let Body::Request(payload) = envelope.body else {
            tracing::warn!(id = %envelope.id, "processor given a non-request envelope");
            return;
        };
        let id = envelope.id;
        let endpoint = envelope.endpoint.unwrap_or_else(|| "/".to_string());

        let outgoing = match self
            .backend
            .call(payload.method, &endpoint, payload.data)
            .await
        {
            Ok(outcome) => Envelope::response(
                id,
                endpoint,
                ResponsePayload {
                    data: outcome.data,
                    error: outcome.error,
                    status: outcome.status,
                },
            ),
            Err(e) => {
                tracing::error!(%id, %endpoint, error = %e, "backend call failed outside contract");
                Envelope::error(Some(id), Some(endpoint), format!("Internal error: {}", e), 500)
            }
        };

        match pump.enqueue(outgoing) {
            Ok(()) => {}
            Err(BridgeError::Backpressure) => {
                // Documented drop: the peer can re-issue the request.
                tracing::warn!("outgoing queue full, dropping response");
            }
            Err(e) => {
                tracing::debug!(error = %e, "peer gone before response could be queued");
            }
        }
    }
}
