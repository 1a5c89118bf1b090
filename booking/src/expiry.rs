//! Hold-expiry helpers.
//!
//! The countdown is derived from the absolute `hold_expires_at` timestamp,
//! never from wall-clock ticks, so a reload or a suspended tab cannot
//! stretch a hold. The terminal transition itself is scheduled by the
//! reducer as a delay effect; these helpers supply the arithmetic and the
//! late-response guard.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Whether the deadline has passed at `now`
#[must_use]
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= expires_at
}

/// Whole seconds left until the deadline, clamped at zero
#[must_use]
pub fn remaining_seconds(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_seconds().max(0)
}

/// Delay to schedule before firing the terminal transition
///
/// Returns [`Duration::ZERO`] when the deadline already passed, so the
/// transition fires on the next tick instead of being scheduled in the
/// past.
#[must_use]
pub fn delay_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (expires_at - now).to_std().unwrap_or(Duration::ZERO)
}
