//! Configuration management for the gateway client.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Gateway configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the hold/queue/order HTTP API
    pub base_url: String,
    /// WebSocket endpoint for realtime queue updates.
    ///
    /// When absent, the push channel is disabled and the coordinator relies
    /// on polling alone.
    pub realtime_url: Option<String>,
    /// Hub name sent as a query parameter when opening the push channel
    pub realtime_hub: String,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Polling cadence bounds
    pub poll: PollConfig,
}

/// Bounds for the adaptive queue-status polling cadence
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollConfig {
    /// Shortest allowed interval between polls, in milliseconds
    pub min_interval_ms: u64,
    /// Longest allowed interval between polls, in milliseconds
    pub max_interval_ms: u64,
}

impl PollConfig {
    /// Shortest allowed interval between polls
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// Longest allowed interval between polls
    #[must_use]
    pub const fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 2_000,
            max_interval_ms: 30_000,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to local-development defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("BOOKING_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api".to_string()),
            realtime_url: env::var("BOOKING_REALTIME_URL").ok(),
            realtime_hub: env::var("BOOKING_REALTIME_HUB")
                .unwrap_or_else(|_| "queue-status".to_string()),
            request_timeout_ms: env::var("BOOKING_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10_000),
            poll: PollConfig {
                min_interval_ms: env::var("BOOKING_POLL_MIN_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2_000),
                max_interval_ms: env::var("BOOKING_POLL_MAX_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30_000),
            },
        }
    }

    /// Per-request timeout as a [`Duration`]
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Whether a realtime endpoint is configured
    #[must_use]
    pub const fn realtime_enabled(&self) -> bool {
        self.realtime_url.is_some()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            realtime_url: None,
            realtime_hub: "queue-status".to_string(),
            request_timeout_ms: 10_000,
            poll: PollConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_disables_realtime() {
        let config = GatewayConfig::default();
        assert!(!config.realtime_enabled());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn poll_bounds_are_ordered_by_default() {
        let poll = PollConfig::default();
        assert!(poll.min_interval() < poll.max_interval());
    }
}
