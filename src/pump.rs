//! Outgoing delivery pump.
//!
//! One pump task per peer drains a bounded queue of envelopes and is the
//! sole caller of the transport's notify primitive, so notification
//! traffic is strictly ordered and frames of two envelopes can never
//! interleave mid-sequence.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher ──┐
//! Processor  ──┼─► mpsc::Sender<Envelope> ─► Pump Task ─► notify() ─► peer
//! Registry   ──┘
//! ```
//!
//! For each dequeued envelope the pump encodes, splits into MTU-bounded
//! frames and sends them in index order with a small pacing delay so the
//! transport's notification buffer is not overrun. A send failure
//! abandons the remaining frames of that envelope — re-sending only part
//! of a sequence would corrupt the peer's reassembly state — and the pump
//! moves on to the next queued envelope.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::BridgeConfig;
use crate::envelope::{self, Envelope};
use crate::error::{BridgeError, Result};
use crate::protocol;

/// Capability to send one raw notification to a connected peer.
///
/// Implemented by the BLE glue code around the bridge; tests implement it
/// with in-memory collectors.
#[async_trait]
pub trait PeerNotifier: Send + Sync + 'static {
    /// Send one frame as a notification.
    async fn notify(&self, frame: Bytes) -> Result<()>;
}

/// Configuration for a pump task.
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Maximum notification size, frame header included.
    pub mtu: usize,
    /// Delay between successive frames of one envelope.
    pub frame_pacing: Duration,
    /// Capacity of the envelope queue.
    pub queue_capacity: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            mtu: crate::config::DEFAULT_MTU,
            frame_pacing: crate::config::DEFAULT_FRAME_PACING,
            queue_capacity: crate::config::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl From<&BridgeConfig> for PumpConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            mtu: config.mtu,
            frame_pacing: config.frame_pacing,
            queue_capacity: config.queue_capacity,
        }
    }
}

/// Handle for enqueueing envelopes to a peer's pump.
///
/// Cheaply cloneable; shared by the dispatcher, the processor and the
/// session registry.
#[derive(Clone)]
pub struct PumpHandle {
    tx: mpsc::Sender<Envelope>,
}

impl PumpHandle {
    /// Queue an envelope for delivery.
    ///
    /// Never blocks. When the queue is at capacity the envelope is
    /// rejected with [`BridgeError::Backpressure`]; callers decide whether
    /// to drop, retry or disconnect (the bridge logs and drops).
    pub fn enqueue(&self, envelope: Envelope) -> Result<()> {
        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BridgeError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => BridgeError::ConnectionClosed,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_handle(capacity: usize) -> (PumpHandle, mpsc::Receiver<Envelope>) {
    let (tx, rx) = mpsc::channel(capacity);
    (PumpHandle { tx }, rx)
}

/// Spawn the pump task for one peer.
///
/// Returns the enqueue handle and the task's join handle. The task exits
/// when every [`PumpHandle`] clone has been dropped.
pub fn spawn_pump(
    notifier: Arc<dyn PeerNotifier>,
    config: PumpConfig,
) -> (PumpHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.queue_capacity);
    let task = tokio::spawn(pump_loop(rx, notifier, config));
    (PumpHandle { tx }, task)
}

/// Main pump loop - encodes, splits and sends queued envelopes one at a time.
async fn pump_loop(
    mut rx: mpsc::Receiver<Envelope>,
    notifier: Arc<dyn PeerNotifier>,
    config: PumpConfig,
) {
    while let Some(envelope) = rx.recv().await {
        if deliver(notifier.as_ref(), &config, &envelope).await {
            tracing::debug!(id = %envelope.id, kind = envelope.body.type_name(), "envelope sent");
        }
    }
}

/// Encode, split and send one envelope frame by frame.
///
/// Returns `false` when the envelope was dropped or abandoned partway,
/// `true` only when every frame went out.
async fn deliver(notifier: &dyn PeerNotifier, config: &PumpConfig, envelope: &Envelope) -> bool {
    let bytes = match envelope::encode(envelope) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(id = %envelope.id, error = %e, "dropping unencodable envelope");
            return false;
        }
    };

    let frames = match protocol::split(&bytes, config.mtu) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(id = %envelope.id, error = %e, "dropping unsplittable envelope");
            return false;
        }
    };

    if frames.len() > 1 {
        tracing::debug!(
            id = %envelope.id,
            frames = frames.len(),
            "envelope exceeds MTU, sending in chunks"
        );
    }

    let count = frames.len();
    for (i, frame) in frames.into_iter().enumerate() {
        if let Err(e) = notifier.notify(frame).await {
            // Remaining frames are useless to the peer now; its
            // reassembly state for this envelope is already broken.
            tracing::warn!(
                id = %envelope.id,
                frame = i,
                error = %e,
                "notification send failed, abandoning envelope"
            );
            return false;
        }

        if i + 1 < count && !config.frame_pacing.is_zero() {
            tokio::time::sleep(config.frame_pacing).await;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Envelope, ResponsePayload};
    use crate::protocol::Reassembler;
    use serde_json::json;
    use tokio::sync::{Mutex, Notify};

    /// Notifier that records every frame it is asked to send.
    struct RecordingNotifier {
        frames: Mutex<Vec<Bytes>>,
    }

    impl RecordingNotifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PeerNotifier for RecordingNotifier {
        async fn notify(&self, frame: Bytes) -> Result<()> {
            self.frames.lock().await.push(frame);
            Ok(())
        }
    }

    /// Notifier that fails the first `fail_first` sends.
    struct FlakyNotifier {
        frames: Mutex<Vec<Bytes>>,
        failures_left: Mutex<usize>,
    }

    #[async_trait]
    impl PeerNotifier for FlakyNotifier {
        async fn notify(&self, frame: Bytes) -> Result<()> {
            let mut left = self.failures_left.lock().await;
            if *left > 0 {
                *left -= 1;
                return Err(BridgeError::Transport("simulated send failure".to_string()));
            }
            drop(left);
            self.frames.lock().await.push(frame);
            Ok(())
        }
    }

    /// Notifier that blocks until told to proceed.
    struct StuckNotifier {
        gate: Notify,
    }

    #[async_trait]
    impl PeerNotifier for StuckNotifier {
        async fn notify(&self, _frame: Bytes) -> Result<()> {
            self.gate.notified().await;
            Ok(())
        }
    }

    fn response_envelope(id: &str, data: serde_json::Value) -> Envelope {
        Envelope::response(
            id,
            "/orders",
            ResponsePayload {
                data,
                error: None,
                status: 200,
            },
        )
    }

    fn fast_config() -> PumpConfig {
        PumpConfig {
            mtu: 512,
            frame_pacing: Duration::from_millis(0),
            queue_capacity: 8,
        }
    }

    #[tokio::test]
    async fn test_small_envelope_is_one_frame() {
        let notifier = RecordingNotifier::new();
        let (handle, task) = spawn_pump(notifier.clone(), fast_config());

        handle.enqueue(response_envelope("r1", json!({}))).unwrap();
        drop(handle);
        task.await.unwrap();

        let frames = notifier.frames.lock().await;
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn test_large_envelope_reassembles_bit_for_bit() {
        let notifier = RecordingNotifier::new();
        let config = PumpConfig {
            mtu: 64,
            ..fast_config()
        };
        let (handle, task) = spawn_pump(notifier.clone(), config);

        let envelope = response_envelope("r1", json!({"blob": "x".repeat(400)}));
        let expected = envelope::encode(&envelope).unwrap();

        handle.enqueue(envelope).unwrap();
        drop(handle);
        task.await.unwrap();

        let frames = notifier.frames.lock().await;
        assert!(frames.len() > 1);

        let mut reassembler = Reassembler::new();
        let mut complete = None;
        for frame in frames.iter() {
            complete = reassembler.push(frame).unwrap();
        }
        assert_eq!(complete.as_deref(), Some(&expected[..]));
    }

    #[tokio::test]
    async fn test_envelopes_sent_in_queue_order() {
        let notifier = RecordingNotifier::new();
        let (handle, task) = spawn_pump(notifier.clone(), fast_config());

        for i in 0..5 {
            handle
                .enqueue(response_envelope(&format!("r{}", i), json!({})))
                .unwrap();
        }
        drop(handle);
        task.await.unwrap();

        let frames = notifier.frames.lock().await;
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            let envelope =
                envelope::decode(&frame[crate::protocol::FRAME_HEADER_SIZE..]).unwrap();
            assert_eq!(envelope.id, format!("r{}", i));
        }
    }

    #[tokio::test]
    async fn test_send_failure_abandons_envelope_but_not_pump() {
        // First send fails: the whole first envelope is abandoned, the
        // second one still goes out.
        let notifier = Arc::new(FlakyNotifier {
            frames: Mutex::new(Vec::new()),
            failures_left: Mutex::new(1),
        });
        let config = PumpConfig {
            mtu: 64,
            ..fast_config()
        };
        let (handle, task) = spawn_pump(notifier.clone(), config);

        handle
            .enqueue(response_envelope("big", json!({"blob": "y".repeat(300)})))
            .unwrap();
        handle.enqueue(response_envelope("next", json!({}))).unwrap();
        drop(handle);
        task.await.unwrap();

        // No continuation frames of "big" may appear after its failed
        // first frame; everything recorded belongs to "next".
        let frames = notifier.frames.lock().await;
        let mut reassembler = Reassembler::new();
        let mut complete = None;
        for frame in frames.iter() {
            complete = reassembler.push(frame).unwrap();
        }
        let envelope = envelope::decode(&complete.unwrap()).unwrap();
        assert_eq!(envelope.id, "next");
    }

    #[tokio::test]
    async fn test_deliver_reports_abandonment() {
        let notifier = Arc::new(FlakyNotifier {
            frames: Mutex::new(Vec::new()),
            failures_left: Mutex::new(1),
        });
        let config = PumpConfig {
            mtu: 64,
            ..fast_config()
        };

        let abandoned = response_envelope("big", json!({"blob": "y".repeat(300)}));
        assert!(!deliver(notifier.as_ref(), &config, &abandoned).await);

        let next = response_envelope("next", json!({}));
        assert!(deliver(notifier.as_ref(), &config, &next).await);
    }

    #[tokio::test]
    async fn test_enqueue_full_queue_is_backpressure() {
        let notifier = Arc::new(StuckNotifier {
            gate: Notify::new(),
        });
        let config = PumpConfig {
            queue_capacity: 1,
            ..fast_config()
        };
        let (handle, _task) = spawn_pump(notifier.clone(), config);

        // First envelope is picked up by the pump and sticks in notify();
        // the second fills the queue.
        handle.enqueue(response_envelope("r1", json!({}))).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.enqueue(response_envelope("r2", json!({}))).unwrap();

        let result = handle.enqueue(response_envelope("r3", json!({})));
        assert!(matches!(result, Err(BridgeError::Backpressure)));

        notifier.gate.notify_waiters();
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_connection_closed() {
        let notifier = RecordingNotifier::new();
        let (handle, task) = spawn_pump(notifier, fast_config());

        let probe = handle.clone();
        drop(handle);
        task.abort();
        let _ = task.await;

        let result = probe.enqueue(response_envelope("r1", json!({})));
        assert!(matches!(result, Err(BridgeError::ConnectionClosed)));
    }
}
