//! Client configuration.
//!
//! One [`ClientConfig`] describes a deployment: where the REST and socket
//! boundaries live, how aggressively to page, and the transport's backoff
//! envelope. Defaults mirror the reference deployment.

use std::time::Duration;

use skiff_core::{DEFAULT_SUBSCRIPTION_CAPACITY, LinkConfig};

/// Configuration for a synchronization session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST boundary, e.g. `http://localhost:8000/api`.
    pub api_base: String,
    /// URL of the socket endpoint, e.g. `ws://localhost:8000/ws`.
    pub socket_url: String,
    /// Messages per history page.
    pub page_size: u32,
    /// Messages requested on each side of a jump-to-message target.
    pub context_radius: u32,
    /// Maximum concurrently subscribed rooms.
    pub subscription_capacity: usize,
    /// Per-request timeout for REST calls.
    pub request_timeout: Duration,
    /// Retries granted to idempotent history reads that fail transiently.
    pub fetch_retry_budget: u32,
    /// How long a typing indicator stays alive without a refresh.
    pub typing_expiry: Duration,
    /// Transport backoff and timeout envelope.
    pub link: LinkConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/api".to_owned(),
            socket_url: "ws://localhost:8000/ws".to_owned(),
            page_size: 50,
            context_radius: 25,
            subscription_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
            request_timeout: Duration::from_secs(10),
            fetch_retry_budget: 2,
            typing_expiry: Duration::from_secs(4),
            link: LinkConfig::default(),
        }
    }
}
