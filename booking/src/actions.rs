//! Actions for the booking coordinator.
//!
//! Commands come from the caller (start, extend, checkout, cancel, reset);
//! result actions are fed back by effects when network calls and timers
//! settle. Every result action carries the identifiers it was issued
//! under, so the reducer can drop results whose attempt has moved on.

use crate::types::BookingErrorCode;
use boxoffice_gateway::error::GatewayError;
use boxoffice_gateway::types::{
    ClaimOutcome, CorrelationId, EventId, ExtendOutcome, HoldId, HoldOutcome, IdempotencyKey,
    OrderReceipt, QueueId, QueueJoinOutcome, QueueStatus, SelectionInput,
};

/// Presentation-supplied checkout details, passed through opaquely
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutPayload {
    /// Customer details as collected by the checkout form
    pub customer_details: serde_json::Value,
    /// Payment instruction as collected by the checkout form
    pub payment: serde_json::Value,
}

/// Why a checkout invocation produced no receipt
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckoutError {
    /// Checkout is only valid while holding; no network call was made
    #[error("No active hold to check out")]
    HoldNotReady,

    /// A submission is already outstanding; no second call was made
    #[error("A checkout is already in progress")]
    AlreadyInProgress,

    /// The backend is still processing a previous submission (recoverable)
    #[error("Checkout already processing")]
    Processing,

    /// The backend rate-limited the submission (recoverable after a pause)
    #[error("Checkout rate limited")]
    RateLimited,

    /// The backend refused the order; surfaced verbatim
    #[error("Checkout rejected (status {status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Error payload, verbatim
        message: String,
    },

    /// The submission may not have reached the backend
    #[error("Checkout transport failure: {message}")]
    Network {
        /// Transport failure description
        message: String,
        /// Whether retrying may succeed
        retryable: bool,
    },
}

impl CheckoutError {
    /// The snapshot error code matching this refusal, if it should be
    /// recorded on the snapshot at all (local guards are not recorded)
    #[must_use]
    pub const fn snapshot_code(&self) -> Option<BookingErrorCode> {
        match self {
            Self::HoldNotReady | Self::AlreadyInProgress => None,
            Self::Processing => Some(BookingErrorCode::CheckoutProcessing),
            Self::RateLimited => Some(BookingErrorCode::RateLimit),
            Self::Rejected { .. } => Some(BookingErrorCode::CheckoutRejected),
            Self::Network { .. } => Some(BookingErrorCode::NetworkError),
        }
    }
}

impl From<boxoffice_gateway::types::CheckoutFailure> for CheckoutError {
    fn from(failure: boxoffice_gateway::types::CheckoutFailure) -> Self {
        use boxoffice_gateway::types::CheckoutFailure;
        match failure {
            CheckoutFailure::Processing => Self::Processing,
            CheckoutFailure::RateLimited => Self::RateLimited,
            CheckoutFailure::Rejected { status, message } => Self::Rejected { status, message },
            CheckoutFailure::Network(error) => Self::Network {
                retryable: error.is_retryable(),
                message: error.to_string(),
            },
        }
    }
}

/// All inputs to the booking reducer
#[derive(Debug, Clone)]
pub enum BookingAction {
    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------
    /// Begin a booking attempt for `event_id` with the given selections
    Start {
        /// Event to book
        event_id: EventId,
        /// Requested categories and quantities
        selections: Vec<SelectionInput>,
        /// Optional caller-supplied identity hint
        requester_id: Option<String>,
    },

    /// Request a later expiry for the current hold
    ExtendHold,

    /// Submit checkout for the current hold
    Checkout {
        /// Presentation-supplied order details
        payload: CheckoutPayload,
        /// Fresh deduplication key minted for this invocation
        submission: IdempotencyKey,
    },

    /// Leave the admission queue and return to idle
    CancelQueue,

    /// Abandon the attempt and return to idle
    Reset,

    /// Re-enter a restored snapshot: re-arm the countdown or fall through
    /// to expiry synchronously
    Resume,

    /// The push channel for `queue_id` became active or inactive
    RealtimeStateChanged {
        /// Queue the feed belongs to
        queue_id: QueueId,
        /// Whether push updates are flowing
        active: bool,
    },

    // ------------------------------------------------------------------
    // Effect results
    // ------------------------------------------------------------------
    /// The hold attempt resolved
    HoldAttemptResolved {
        /// Attempt the call was issued under
        correlation_id: CorrelationId,
        /// Backend outcome
        outcome: HoldOutcome,
    },

    /// The hold attempt did not reach the backend
    HoldAttemptFailed {
        /// Attempt the call was issued under
        correlation_id: CorrelationId,
        /// Transport classification
        error: GatewayError,
    },

    /// The explicit queue-join fallback resolved
    QueueJoinResolved {
        /// Attempt the call was issued under
        correlation_id: CorrelationId,
        /// Backend outcome
        outcome: QueueJoinOutcome,
    },

    /// The explicit queue-join fallback did not reach the backend
    QueueJoinFailed {
        /// Attempt the call was issued under
        correlation_id: CorrelationId,
        /// Transport classification
        error: GatewayError,
    },

    /// A queue-status update arrived from the poll loop or the push feed
    QueueStatusReceived {
        /// Queue the update belongs to
        queue_id: QueueId,
        /// The update
        status: QueueStatus,
    },

    /// The post-admission hold claim resolved
    ClaimResolved {
        /// Queue the claim was issued for
        queue_id: QueueId,
        /// Backend outcome
        outcome: ClaimOutcome,
    },

    /// The post-admission hold claim did not reach the backend
    ClaimFailed {
        /// Queue the claim was issued for
        queue_id: QueueId,
        /// Transport classification
        error: GatewayError,
    },

    /// The hold extension resolved
    ExtendResolved {
        /// Attempt the call was issued under
        correlation_id: CorrelationId,
        /// Backend outcome
        outcome: ExtendOutcome,
    },

    /// The hold extension did not reach the backend
    ExtendFailed {
        /// Attempt the call was issued under
        correlation_id: CorrelationId,
        /// Transport classification
        error: GatewayError,
    },

    /// The hold countdown elapsed
    HoldExpired {
        /// Hold the timer was armed for
        hold_id: HoldId,
    },

    /// A checkout invocation was refused locally, without a network call
    CheckoutRefused {
        /// Invocation the refusal belongs to
        submission: IdempotencyKey,
        /// Refusal reason
        reason: CheckoutError,
    },

    /// The checkout submission resolved
    CheckoutResolved {
        /// Invocation the result belongs to
        submission: IdempotencyKey,
        /// Receipt or classified failure
        outcome: Result<OrderReceipt, CheckoutError>,
    },
}
