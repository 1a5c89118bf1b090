//! Configuration for the booking coordinator.
//!
//! Loads from environment variables with sensible defaults, composing the
//! gateway's polling bounds so one object carries everything the watch
//! needs.

use boxoffice_gateway::config::PollConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    /// How long a persisted `InQueue` snapshot stays restorable, in seconds.
    ///
    /// Queues carry no absolute expiry, so restoration falls back to the
    /// age of the last mutation.
    pub queue_stale_after_secs: u64,
    /// How long `checkout()` waits for its terminal result, in milliseconds
    pub checkout_wait_ms: u64,
    /// Polling cadence bounds for the queue watch
    pub poll: PollConfig,
}

impl BookingConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            queue_stale_after_secs: env::var("BOOKING_QUEUE_STALE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(900),
            checkout_wait_ms: env::var("BOOKING_CHECKOUT_WAIT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30_000),
            poll: boxoffice_gateway::config::GatewayConfig::from_env().poll,
        }
    }

    /// Staleness bound for restored queue snapshots
    #[must_use]
    pub fn queue_stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.queue_stale_after_secs).unwrap_or(i64::MAX))
    }

    /// Timeout for a checkout round trip
    #[must_use]
    pub const fn checkout_wait(&self) -> Duration {
        Duration::from_millis(self.checkout_wait_ms)
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            queue_stale_after_secs: 900,
            checkout_wait_ms: 30_000,
            poll: PollConfig::default(),
        }
    }
}
