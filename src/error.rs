//! Error types for gattbridge.

use thiserror::Error;

/// Main error type for all bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Envelope could not be serialized to JSON.
    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// Received bytes are not valid JSON.
    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),

    /// Envelope is valid JSON but required fields are missing or mistyped.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Frame with an unexpected index, or an overlapping envelope.
    #[error("Framing error: {0}")]
    Framing(String),

    /// Outgoing queue is full.
    #[error("Outgoing queue full")]
    Backpressure,

    /// Peer session closed (pump task gone).
    #[error("Connection closed")]
    ConnectionClosed,

    /// Transport rejected a notification send.
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP client error outside the backend collaborator's contract.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
