//! Backend API collaborator.
//!
//! The bridge forwards decoded requests to an HTTP-style backend through
//! the [`BackendApi`] trait. The trait's contract is deliberately narrow:
//! one call in, one tri-state [`ApiOutcome`] out. Ordinary HTTP-level
//! errors (4xx/5xx) and connectivity failures are both *outcomes*, not
//! `Err` — `Err` is reserved for faults outside the contract, which the
//! processor reports to the peer as a status-500 error envelope.
//!
//! [`ApiClient`] is the production implementation on top of `reqwest`;
//! tests substitute their own impls.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::BridgeConfig;
use crate::envelope::Method;
use crate::error::Result;

/// Tri-state result of one backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiOutcome {
    /// Response body on success, `null` otherwise.
    pub data: Value,
    /// Error message for HTTP-level or connectivity failures.
    pub error: Option<String>,
    /// HTTP status code; 0 means the backend was unreachable.
    pub status: u16,
}

impl ApiOutcome {
    /// Successful call with a body.
    pub fn ok(data: Value, status: u16) -> Self {
        Self {
            data,
            error: None,
            status,
        }
    }

    /// HTTP-level failure (4xx/5xx).
    pub fn failed(error: impl Into<String>, status: u16) -> Self {
        Self {
            data: Value::Null,
            error: Some(error.into()),
            status,
        }
    }

    /// Backend unreachable (connection refused, timeout, DNS).
    pub fn unreachable(error: impl Into<String>) -> Self {
        Self {
            data: Value::Null,
            error: Some(error.into()),
            status: 0,
        }
    }
}

/// Capability to perform one method+endpoint+payload request.
#[async_trait]
pub trait BackendApi: Send + Sync + 'static {
    /// Perform the request and report its outcome.
    ///
    /// Implementations must represent ordinary HTTP errors and
    /// connectivity faults via the outcome, not via `Err`.
    async fn call(&self, method: Method, endpoint: &str, data: Option<Value>) -> Result<ApiOutcome>;
}

/// HTTP client forwarding requests to the configured backend.
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    /// Create a client for the backend named in the config.
    pub fn new(config: &BridgeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent("POS-Bluetooth-Proxy/1.0")
            .build()?;

        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }
}

#[async_trait]
impl BackendApi for ApiClient {
    async fn call(&self, method: Method, endpoint: &str, data: Option<Value>) -> Result<ApiOutcome> {
        let url = self.url_for(endpoint);
        tracing::debug!(method = method.as_str(), %url, "forwarding request to backend");

        let mut request = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        };

        // GET carries data as query parameters, write methods as a JSON body.
        if let Some(data) = data {
            request = match method {
                Method::Get => request.query(&data),
                _ => request.json(&data),
            };
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(%url, error = %e, "backend request failed");
                return Ok(ApiOutcome::unreachable(format!("Connection error: {}", e)));
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                return Ok(ApiOutcome::unreachable(format!("Connection error: {}", e)));
            }
        };

        // Non-JSON bodies are wrapped instead of rejected.
        let body: Value = serde_json::from_str(&body).unwrap_or_else(|_| json!({ "text": body }));

        if (200..300).contains(&status) {
            Ok(ApiOutcome::ok(body, status))
        } else {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string();
            tracing::warn!(status, %message, "backend returned error");
            Ok(ApiOutcome::failed(message, status))
        }
    }
}
