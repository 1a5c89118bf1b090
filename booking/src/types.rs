//! State types for the booking coordinator.
//!
//! The [`BookingSnapshot`] is the single source of truth for one booking
//! attempt: serializable, mutated only by the reducer, observed by the UI
//! as immutable copies.

use boxoffice_gateway::types::{
    CorrelationId, EventId, GrantedHold, HoldId, HoldToken, QueueId, SelectionInput,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of the booking state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BookingStage {
    /// No attempt in progress
    Idle,
    /// Hold attempt submitted, outcome pending
    TryingHold,
    /// Waiting in the admission queue
    InQueue,
    /// Hold granted; countdown running, checkout available
    ReadyWithHold,
    /// Hold or queue entry timed out or was cancelled
    Expired,
    /// The attempt failed; terminal until reset or a fresh start
    Error,
}

impl BookingStage {
    /// Whether an attempt is currently underway
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::TryingHold | Self::InQueue | Self::ReadyWithHold)
    }
}

impl fmt::Display for BookingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::TryingHold => "trying-hold",
            Self::InQueue => "in-queue",
            Self::ReadyWithHold => "ready-with-hold",
            Self::Expired => "expired",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Machine-readable failure classification surfaced to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingErrorCode {
    /// `start()` called without an event or selections
    SelectionRequired,
    /// A new attempt was started while one is underway
    AttemptInProgress,
    /// The backend refused the hold and the queue fallback
    HoldRejected,
    /// The backend refused the explicit queue join
    QueueRejected,
    /// The post-admission hold claim was refused
    ClaimFailed,
    /// The hold countdown elapsed
    HoldExpired,
    /// The queue entry timed out on the backend
    QueueExpired,
    /// The queue entry was cancelled on the backend
    QueueCancelled,
    /// A transport-level failure; retrying may succeed
    NetworkError,
    /// A hold extension was refused; the previous deadline stands
    ExtendFailed,
    /// The backend is still processing a previous checkout submission
    CheckoutProcessing,
    /// The backend rate-limited the checkout submission
    RateLimit,
    /// The backend rejected the order
    CheckoutRejected,
}

/// Last failure recorded on the snapshot, cleared on successful transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingError {
    /// Failure classification
    pub code: BookingErrorCode,
    /// Human-readable detail
    pub message: String,
    /// Whether retrying the triggering operation may succeed
    #[serde(default)]
    pub retryable: bool,
}

impl BookingError {
    /// Create a non-retryable error
    #[must_use]
    pub fn new(code: BookingErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: false,
        }
    }

    /// Create a retryable (transport-level) error
    #[must_use]
    pub fn retryable(code: BookingErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: true,
        }
    }
}

impl fmt::Display for BookingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// The authoritative, serializable state of one booking attempt
///
/// Invariants maintained by the reducer:
/// - `hold_token` is present exactly when `stage == ReadyWithHold`
/// - `queue_id` is present exactly when `stage == InQueue`
/// - `hold_expires_at` only moves forward, except via a successful extend
/// - one `correlation_id` per attempt; a fresh start mints a new one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSnapshot {
    /// Current stage of the state machine
    pub stage: BookingStage,
    /// Event being booked
    pub event_id: Option<EventId>,
    /// Requested categories and quantities, immutable once submitted
    pub selections: Vec<SelectionInput>,
    /// Queue entry identifier while waiting
    pub queue_id: Option<QueueId>,
    /// Advisory queue position
    pub queue_position: Option<u32>,
    /// Advisory seconds until admission
    pub queue_eta_seconds: Option<u32>,
    /// Identifier of the granted hold
    pub hold_id: Option<HoldId>,
    /// Credential required for checkout and extension
    pub hold_token: Option<HoldToken>,
    /// Absolute expiry of the hold
    pub hold_expires_at: Option<DateTime<Utc>>,
    /// Correlation identifier of this attempt
    pub correlation_id: Option<CorrelationId>,
    /// Optional caller-supplied identity hint
    pub requester_id: Option<String>,
    /// Whether a push subscription is currently supplying queue updates
    pub realtime_active: bool,
    /// Last failure reason, cleared on successful transition
    pub error: Option<BookingError>,
    /// Timestamp of the last mutation
    pub last_updated: DateTime<Utc>,
    /// A checkout submission is outstanding; never persisted
    #[serde(skip)]
    pub checkout_in_flight: bool,
    /// A hold claim is outstanding after queue admission; never persisted
    #[serde(skip)]
    pub claim_in_flight: bool,
}

impl BookingSnapshot {
    /// Fresh snapshot with no attempt in progress
    #[must_use]
    pub fn idle(now: DateTime<Utc>) -> Self {
        Self {
            stage: BookingStage::Idle,
            event_id: None,
            selections: Vec::new(),
            queue_id: None,
            queue_position: None,
            queue_eta_seconds: None,
            hold_id: None,
            hold_token: None,
            hold_expires_at: None,
            correlation_id: None,
            requester_id: None,
            realtime_active: false,
            error: None,
            last_updated: now,
            checkout_in_flight: false,
            claim_in_flight: false,
        }
    }

    /// Record a mutation timestamp
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = now;
    }

    /// Drop queue placement fields
    pub fn clear_queue_fields(&mut self) {
        self.queue_id = None;
        self.queue_position = None;
        self.queue_eta_seconds = None;
        self.realtime_active = false;
        self.claim_in_flight = false;
    }

    /// Drop hold credential fields
    pub fn clear_hold_fields(&mut self) {
        self.hold_id = None;
        self.hold_token = None;
        self.hold_expires_at = None;
    }

    /// Install a granted hold and move to `ReadyWithHold`
    pub fn apply_hold(&mut self, hold: GrantedHold, now: DateTime<Utc>) {
        self.stage = BookingStage::ReadyWithHold;
        self.hold_id = Some(hold.hold_id);
        self.hold_token = Some(hold.hold_token);
        self.hold_expires_at = Some(hold.hold_expires_at);
        self.clear_queue_fields();
        self.error = None;
        self.touch(now);
    }

    /// Seconds left on the hold countdown, if one is running
    #[must_use]
    pub fn remaining_hold_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.hold_expires_at
            .map(|expires| crate::expiry::remaining_seconds(expires, now))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn stage_serializes_kebab_case() {
        let json = serde_json::to_string(&BookingStage::ReadyWithHold).unwrap();
        assert_eq!(json, "\"ready-with-hold\"");
    }

    #[test]
    fn error_code_serializes_snake_case() {
        let json = serde_json::to_string(&BookingErrorCode::HoldExpired).unwrap();
        assert_eq!(json, "\"hold_expired\"");
    }

    #[test]
    fn idle_snapshot_carries_no_credentials() {
        let snapshot = BookingSnapshot::idle(Utc::now());
        assert_eq!(snapshot.stage, BookingStage::Idle);
        assert!(snapshot.hold_token.is_none());
        assert!(snapshot.queue_id.is_none());
        assert!(!snapshot.checkout_in_flight);
    }

    #[test]
    fn checkout_flag_is_not_persisted() {
        let mut snapshot = BookingSnapshot::idle(Utc::now());
        snapshot.checkout_in_flight = true;
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: BookingSnapshot = serde_json::from_str(&json).unwrap();
        assert!(!restored.checkout_in_flight);
    }

    #[test]
    fn apply_hold_clears_queue_and_error() {
        let now = Utc::now();
        let mut snapshot = BookingSnapshot::idle(now);
        snapshot.stage = BookingStage::InQueue;
        snapshot.queue_id = Some("q-1".into());
        snapshot.queue_position = Some(4);
        snapshot.error = Some(BookingError::new(BookingErrorCode::NetworkError, "blip"));

        snapshot.apply_hold(
            GrantedHold {
                hold_id: "hold-1".into(),
                hold_token: HoldToken::new("tok"),
                hold_expires_at: now + chrono::Duration::minutes(5),
            },
            now,
        );

        assert_eq!(snapshot.stage, BookingStage::ReadyWithHold);
        assert!(snapshot.queue_id.is_none());
        assert!(snapshot.queue_position.is_none());
        assert!(snapshot.error.is_none());
        assert!(snapshot.hold_token.is_some());
    }
}
