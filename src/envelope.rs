//! JSON message envelope and its codec.
//!
//! The envelope is the unit of protocol exchange in both directions:
//!
//! ```json
//! {"id": "...", "type": "request", "endpoint": "/orders",
//!  "timestamp": 1700000000000, "payload": {"method": "GET"}}
//! ```
//!
//! The `type`/`payload` pair is modeled as the [`Body`] sum type so that
//! each envelope kind carries its own strongly typed payload. Encoding and
//! decoding are pure; decoding distinguishes invalid JSON
//! ([`BridgeError::Decode`]) from a well-formed object that fails the
//! envelope schema ([`BridgeError::Validation`]).

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{BridgeError, Result};

/// Protocol version reported in the welcome envelope.
pub const PROTOCOL_VERSION: &str = "1.0";

/// HTTP method carried by a request envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Uppercase wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// Payload of a `request` envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// HTTP method to forward (defaults to GET when omitted).
    #[serde(default)]
    pub method: Method,
    /// Request body (POST/PUT/PATCH) or query parameters (GET).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Payload of a `response` envelope, mirroring the backend call outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// Response body on success, `null` on failure.
    pub data: Value,
    /// Error message when the backend call failed.
    pub error: Option<String>,
    /// HTTP status code (0 for connectivity failures).
    pub status: u16,
}

/// Payload of an `error` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable description of what was wrong.
    pub message: String,
    /// HTTP-equivalent status code.
    pub status: u16,
}

/// Type-discriminated envelope payload.
///
/// Serializes as the sibling fields `"type"` and `"payload"` of the
/// envelope object. Decoding tolerates a missing or `null` `payload` on
/// `request` envelopes: it reads as a GET with no data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Body {
    Request(RequestPayload),
    Response(ResponsePayload),
    Error(ErrorPayload),
    System(Value),
}

impl<'de> Deserialize<'de> for Body {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Tagged {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            payload: Option<Value>,
        }

        let Tagged { kind, payload } = Tagged::deserialize(deserializer)?;
        let payload = payload.unwrap_or(Value::Null);
        match kind.as_str() {
            "request" if payload.is_null() => Ok(Body::Request(RequestPayload::default())),
            "request" => serde_json::from_value(payload)
                .map(Body::Request)
                .map_err(serde::de::Error::custom),
            "response" => serde_json::from_value(payload)
                .map(Body::Response)
                .map_err(serde::de::Error::custom),
            "error" => serde_json::from_value(payload)
                .map(Body::Error)
                .map_err(serde::de::Error::custom),
            "system" => Ok(Body::System(payload)),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["request", "response", "error", "system"],
            )),
        }
    }
}

impl Body {
    /// Wire name of this envelope type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Body::Request(_) => "request",
            Body::Response(_) => "response",
            Body::Error(_) => "error",
            Body::System(_) => "system",
        }
    }
}

/// The protocol message unit exchanged over the characteristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation token: caller-supplied for requests, echoed back on
    /// responses and errors.
    pub id: String,
    /// Logical resource path. Required for all types except `system`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Milliseconds since epoch, set at envelope creation. Inbound
    /// envelopes may omit it (it is informational, never acted on).
    #[serde(default)]
    pub timestamp: i64,
    #[serde(flatten)]
    pub body: Body,
}

impl Envelope {
    /// Create a request envelope.
    pub fn request(id: impl Into<String>, endpoint: impl Into<String>, payload: RequestPayload) -> Self {
        Self {
            id: id.into(),
            endpoint: Some(endpoint.into()),
            timestamp: now_ms(),
            body: Body::Request(payload),
        }
    }

    /// Create a response envelope correlated to a request.
    pub fn response(id: impl Into<String>, endpoint: impl Into<String>, payload: ResponsePayload) -> Self {
        Self {
            id: id.into(),
            endpoint: Some(endpoint.into()),
            timestamp: now_ms(),
            body: Body::Response(payload),
        }
    }

    /// Create an error envelope.
    ///
    /// When the offending message's id or endpoint could not be recovered,
    /// a fresh id and the root endpoint are used so the peer still gets a
    /// well-formed error.
    pub fn error(id: Option<String>, endpoint: Option<String>, message: impl Into<String>, status: u16) -> Self {
        Self {
            id: id.unwrap_or_else(generate_id),
            endpoint: Some(endpoint.unwrap_or_else(|| "/".to_string())),
            timestamp: now_ms(),
            body: Body::Error(ErrorPayload {
                message: message.into(),
                status,
            }),
        }
    }

    /// Create a system envelope with a fresh id.
    pub fn system(payload: Value) -> Self {
        Self {
            id: generate_id(),
            endpoint: Some("/".to_string()),
            timestamp: now_ms(),
            body: Body::System(payload),
        }
    }

    /// Check if this is a request envelope.
    #[inline]
    pub fn is_request(&self) -> bool {
        matches!(self.body, Body::Request(_))
    }

    /// Validate schema rules that serde alone does not enforce.
    fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(BridgeError::Validation("Missing message ID".to_string()));
        }
        if self.endpoint.as_deref().unwrap_or("").is_empty() && !matches!(self.body, Body::System(_)) {
            return Err(BridgeError::Validation("Missing endpoint".to_string()));
        }
        Ok(())
    }
}

/// Serialize an envelope to its JSON wire form.
pub fn encode(envelope: &Envelope) -> Result<Bytes> {
    let vec = serde_json::to_vec(envelope).map_err(BridgeError::Encode)?;
    Ok(Bytes::from(vec))
}

/// Deserialize and validate an envelope from its JSON wire form.
///
/// # Errors
///
/// - [`BridgeError::Decode`] if the bytes are not valid JSON
/// - [`BridgeError::Validation`] if the JSON does not match the envelope
///   schema (missing/mistyped `id`, `type`, or `endpoint`)
pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    let value: Value = serde_json::from_slice(bytes).map_err(BridgeError::Decode)?;
    let envelope: Envelope =
        serde_json::from_value(value).map_err(|e| BridgeError::Validation(e.to_string()))?;
    envelope.validate()?;
    Ok(envelope)
}

/// Best-effort extraction of the `id` field from possibly-invalid bytes.
///
/// Used to address an error envelope when the incoming message failed to
/// decode but its id is still recoverable.
pub fn peek_id(bytes: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    value.get("id")?.as_str().map(|s| s.to_string())
}

/// Best-effort extraction of the `endpoint` field, see [`peek_id`].
pub fn peek_endpoint(bytes: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    value.get("endpoint")?.as_str().map(|s| s.to_string())
}

/// Generate a fresh envelope id.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time in milliseconds since epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
