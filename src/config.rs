//! Bridge configuration.
//!
//! Collects the knobs the surrounding process decides (base URL, device
//! identity, MTU, pacing, capacities) into one struct. How values get here
//! (env, flags, files) is the caller's business; the library only consumes
//! them.

use std::time::Duration;

/// Default maximum notification size in bytes.
pub const DEFAULT_MTU: usize = crate::protocol::DEFAULT_MTU;

/// Default delay between frames of one envelope.
pub const DEFAULT_FRAME_PACING: Duration = Duration::from_millis(10);

/// Default capacity of a peer's outgoing envelope queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default bound on concurrently processed requests.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 32;

/// Default backend request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a [`Bridge`](crate::Bridge) instance.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base URL of the backend API.
    pub api_base_url: String,
    /// Advertised device name, reported in the welcome envelope.
    pub device_name: String,
    /// GATT service UUID, reported in the welcome envelope.
    pub service_uuid: String,
    /// GATT characteristic UUID, reported in the welcome envelope.
    pub characteristic_uuid: String,
    /// Maximum notification size the transport accepts, header included.
    pub mtu: usize,
    /// Delay between successive frames of one envelope.
    pub frame_pacing: Duration,
    /// Capacity of each peer's outgoing envelope queue.
    pub queue_capacity: usize,
    /// Maximum requests processed concurrently across all peers.
    pub max_concurrent_requests: usize,
    /// Timeout applied to each backend call.
    pub request_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://bt-api.local".to_string(),
            device_name: "POS-Proxy".to_string(),
            service_uuid: "00000000-1111-2222-3333-444444444444".to_string(),
            characteristic_uuid: "11111111-2222-3333-4444-555555555555".to_string(),
            mtu: DEFAULT_MTU,
            frame_pacing: DEFAULT_FRAME_PACING,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.mtu, 512);
        assert_eq!(config.frame_pacing, Duration::from_millis(10));
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(config.api_base_url.starts_with("https://"));
    }
}
