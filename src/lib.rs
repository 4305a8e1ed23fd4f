//! # gattbridge
//!
//! Bridges a size-limited BLE GATT characteristic (write/notify) to an
//! HTTP-style backend API.
//!
//! A peer writes a JSON request envelope to the characteristic; the bridge
//! forwards it to the backend, then delivers the response back as one or
//! more notifications, splitting any payload larger than the transport MTU
//! into indexed frames.
//!
//! ## Architecture
//!
//! - **Envelope** (JSON): `{id, type, endpoint, timestamp, payload}`
//! - **Framing**: 4-byte `{index, total}` header per frame, so a receiver
//!   can reassemble multi-frame envelopes and detect loss
//! - **Pump**: a single task per peer drains a bounded queue and is the
//!   only caller of the transport's notify primitive
//!
//! The BLE stack and the HTTP client are consumed through two small
//! capabilities: [`PeerNotifier`] (send one notification) and
//! [`BackendApi`] (perform one request, return `{data, error, status}`).
//!
//! ## Example
//!
//! ```ignore
//! use gattbridge::{ApiClient, Bridge, BridgeConfig};
//!
//! #[tokio::main]
//! async fn main() -> gattbridge::Result<()> {
//!     let config = BridgeConfig::default();
//!     let backend = ApiClient::new(&config)?;
//!     let bridge = Bridge::builder().config(config).build(backend);
//!
//!     // Wire these into the BLE stack's callbacks:
//!     let session = bridge.on_connect(notifier).await?;
//!     bridge.on_write(session, &written_bytes).await;
//!     bridge.on_disconnect(session).await;
//!     bridge.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod envelope;
pub mod error;
pub mod protocol;
pub mod pump;

mod bridge;
mod dispatcher;
mod processor;
mod session;

pub use backend::{ApiClient, ApiOutcome, BackendApi};
pub use bridge::{Bridge, BridgeBuilder};
pub use config::BridgeConfig;
pub use envelope::{Body, Envelope, Method};
pub use error::{BridgeError, Result};
pub use pump::{PeerNotifier, PumpHandle};
pub use session::SessionId;
