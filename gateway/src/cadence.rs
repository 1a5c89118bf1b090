//! Adaptive polling cadence for queue status.
//!
//! The poll interval is derived from the latest advisory queue placement:
//! a large position means admission is far off and polling can relax; a
//! small ETA means readiness is imminent and polling tightens toward the
//! configured floor. The watch suspends polling entirely while the
//! realtime feed is active, so this cadence only governs the fallback.

use crate::config::PollConfig;
use std::time::Duration;

/// Fraction of the advisory ETA to wait between polls
const ETA_DIVISOR: u64 = 4;

/// Per-position relaxation applied when the queue is deep
const PER_POSITION_MS: u64 = 200;

/// Compute the delay before the next queue-status poll
///
/// The result is clamped to the configured `[min, max]` bounds. Position
/// and ETA are advisory display values; they shape cadence but never
/// correctness.
#[must_use]
pub fn poll_interval(position: u32, eta_seconds: u32, config: &PollConfig) -> Duration {
    let eta_driven = Duration::from_secs(u64::from(eta_seconds) / ETA_DIVISOR);
    let position_driven = Duration::from_millis(u64::from(position) * PER_POSITION_MS);

    let candidate = eta_driven.max(position_driven);

    candidate.clamp(config.min_interval(), config.max_interval())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(min_ms: u64, max_ms: u64) -> PollConfig {
        PollConfig {
            min_interval_ms: min_ms,
            max_interval_ms: max_ms,
        }
    }

    #[test]
    fn imminent_eta_polls_at_the_floor() {
        let config = bounds(2_000, 30_000);
        assert_eq!(poll_interval(1, 3, &config), config.min_interval());
    }

    #[test]
    fn deep_queue_relaxes_toward_the_ceiling() {
        let config = bounds(2_000, 30_000);
        assert_eq!(poll_interval(500, 0, &config), config.max_interval());
    }

    #[test]
    fn long_eta_dominates_small_position() {
        let config = bounds(2_000, 30_000);
        // 60s ETA / 4 = 15s, above the 2s the position alone would suggest
        assert_eq!(poll_interval(10, 60, &config), Duration::from_secs(15));
    }

    #[test]
    fn result_never_leaves_the_configured_bounds() {
        let config = bounds(2_000, 30_000);
        for position in [0u32, 1, 10, 100, 10_000] {
            for eta in [0u32, 1, 30, 600, 86_400] {
                let interval = poll_interval(position, eta, &config);
                assert!(interval >= config.min_interval());
                assert!(interval <= config.max_interval());
            }
        }
    }
}
