//! The booking state machine.
//!
//! One reducer owns every transition of a booking attempt: hold
//! acquisition with queue fallback, queue watching with stale-update
//! filtering, the hold countdown, extension, and exactly-once checkout.
//! Async results are applied only when the identifiers they were issued
//! under still match the live snapshot; anything else is dropped.

use crate::actions::{BookingAction, CheckoutError};
use crate::expiry;
use crate::types::{BookingError, BookingErrorCode, BookingSnapshot, BookingStage};
use boxoffice_core::environment::Clock;
use boxoffice_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use boxoffice_gateway::client::TicketGateway;
use boxoffice_gateway::types::{
    ClaimOutcome, CorrelationId, ExtendOutcome, GrantedHold, HoldId, HoldOutcome, HoldRequest,
    OrderRequest, QueueJoinOutcome, QueuePlacement, QueueStatus,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Dependencies injected into the booking reducer
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Gateway to the hold, queue, and order services
    pub gateway: Arc<dyn TicketGateway>,
    /// Clock for countdown arithmetic and mutation timestamps
    pub clock: Arc<dyn Clock>,
}

impl BookingEnvironment {
    /// Creates a new `BookingEnvironment`
    #[must_use]
    pub fn new(gateway: Arc<dyn TicketGateway>, clock: Arc<dyn Clock>) -> Self {
        Self { gateway, clock }
    }
}

/// Reducer for the booking state machine
#[derive(Clone, Debug, Default)]
pub struct BookingReducer;

impl BookingReducer {
    /// Creates a new `BookingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_start(
        event_id: &boxoffice_gateway::types::EventId,
        selections: &[boxoffice_gateway::types::SelectionInput],
    ) -> Result<(), BookingError> {
        if event_id.is_empty() {
            return Err(BookingError::new(
                BookingErrorCode::SelectionRequired,
                "an event must be chosen before booking",
            ));
        }
        if selections.is_empty() || selections.iter().any(|s| s.quantity == 0) {
            return Err(BookingError::new(
                BookingErrorCode::SelectionRequired,
                "at least one ticket must be selected",
            ));
        }
        Ok(())
    }

    fn enter_queue(state: &mut BookingSnapshot, placement: QueuePlacement, now: DateTime<Utc>) {
        state.stage = BookingStage::InQueue;
        state.queue_id = Some(placement.queue_id);
        state.queue_position = Some(placement.position);
        state.queue_eta_seconds = Some(placement.eta_seconds);
        state.claim_in_flight = false;
        state.error = None;
        state.touch(now);
    }

    fn expire(state: &mut BookingSnapshot, error: BookingError, now: DateTime<Utc>) {
        state.stage = BookingStage::Expired;
        state.clear_hold_fields();
        state.clear_queue_fields();
        state.error = Some(error);
        state.touch(now);
    }

    /// Install a hold and arm the countdown for its deadline
    fn grant_hold(
        state: &mut BookingSnapshot,
        hold: GrantedHold,
        now: DateTime<Utc>,
    ) -> SmallVec<[Effect<BookingAction>; 4]> {
        let hold_id = hold.hold_id.clone();
        let expires_at = hold.hold_expires_at;
        state.apply_hold(hold, now);
        smallvec![Self::expiry_effect(hold_id, expires_at, now)]
    }

    fn expiry_effect(
        hold_id: HoldId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Effect<BookingAction> {
        Effect::Delay {
            duration: expiry::delay_until(expires_at, now),
            action: Box::new(BookingAction::HoldExpired { hold_id }),
        }
    }

    fn refusal_effect(
        submission: boxoffice_gateway::types::IdempotencyKey,
        reason: CheckoutError,
    ) -> SmallVec<[Effect<BookingAction>; 4]> {
        smallvec![Effect::future(async move {
            Some(BookingAction::CheckoutRefused { submission, reason })
        })]
    }

    fn correlation_matches(state: &BookingSnapshot, correlation_id: CorrelationId) -> bool {
        state.correlation_id == Some(correlation_id)
    }
}

impl Reducer for BookingReducer {
    type State = BookingSnapshot;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per transition of the state machine
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Start ==========
            BookingAction::Start {
                event_id,
                selections,
                requester_id,
            } => {
                let now = env.clock.now();

                if state.stage.is_active() {
                    tracing::warn!(stage = %state.stage, "Start refused: attempt already underway");
                    state.error = Some(BookingError::new(
                        BookingErrorCode::AttemptInProgress,
                        "a booking attempt is already underway",
                    ));
                    state.touch(now);
                    return SmallVec::new();
                }

                if let Err(error) = Self::validate_start(&event_id, &selections) {
                    *state = BookingSnapshot::idle(now);
                    state.error = Some(error);
                    return SmallVec::new();
                }

                let correlation_id = CorrelationId::new();
                *state = BookingSnapshot::idle(now);
                state.stage = BookingStage::TryingHold;
                state.event_id = Some(event_id.clone());
                state.selections = selections.clone();
                state.requester_id = requester_id.clone();
                state.correlation_id = Some(correlation_id);

                tracing::info!(
                    correlation_id = %correlation_id,
                    event_id = %event_id,
                    selections = selections.len(),
                    "Booking attempt started"
                );

                let gateway = Arc::clone(&env.gateway);
                let request = HoldRequest {
                    event_id,
                    selections,
                    requester_id,
                    trace_id: Some(correlation_id.to_string()),
                };

                smallvec![Effect::future(async move {
                    match gateway.attempt_hold(&request, correlation_id).await {
                        Ok(outcome) => Some(BookingAction::HoldAttemptResolved {
                            correlation_id,
                            outcome,
                        }),
                        Err(error) => Some(BookingAction::HoldAttemptFailed {
                            correlation_id,
                            error,
                        }),
                    }
                })]
            }

            // ========== Hold attempt outcome ==========
            BookingAction::HoldAttemptResolved {
                correlation_id,
                outcome,
            } => {
                if state.stage != BookingStage::TryingHold
                    || !Self::correlation_matches(state, correlation_id)
                {
                    tracing::debug!(correlation_id = %correlation_id, "Dropping stale hold outcome");
                    return SmallVec::new();
                }
                let now = env.clock.now();

                match outcome {
                    HoldOutcome::Acquired { hold } => {
                        tracing::info!(correlation_id = %correlation_id, "Hold acquired");
                        Self::grant_hold(state, hold, now)
                    }
                    HoldOutcome::Queued { placement } => {
                        tracing::info!(
                            correlation_id = %correlation_id,
                            queue_id = %placement.queue_id,
                            position = placement.position,
                            "Queued for admission"
                        );
                        Self::enter_queue(state, placement, now);
                        SmallVec::new()
                    }
                    HoldOutcome::Rejected { reason, detail } => {
                        // The hold endpoint offered no queue placement; fall
                        // back to an explicit join before giving up.
                        tracing::warn!(
                            correlation_id = %correlation_id,
                            reason = %reason,
                            "Hold rejected, falling back to queue join"
                        );
                        state.error = Some(BookingError::new(
                            BookingErrorCode::HoldRejected,
                            detail.unwrap_or(reason),
                        ));
                        state.touch(now);

                        let Some(event_id) = state.event_id.clone() else {
                            state.stage = BookingStage::Error;
                            return SmallVec::new();
                        };

                        let gateway = Arc::clone(&env.gateway);
                        let request = HoldRequest {
                            event_id,
                            selections: state.selections.clone(),
                            requester_id: state.requester_id.clone(),
                            trace_id: Some(correlation_id.to_string()),
                        };

                        smallvec![Effect::future(async move {
                            match gateway.join_queue(&request, correlation_id).await {
                                Ok(outcome) => Some(BookingAction::QueueJoinResolved {
                                    correlation_id,
                                    outcome,
                                }),
                                Err(error) => Some(BookingAction::QueueJoinFailed {
                                    correlation_id,
                                    error,
                                }),
                            }
                        })]
                    }
                }
            }

            BookingAction::HoldAttemptFailed {
                correlation_id,
                error,
            } => {
                if state.stage != BookingStage::TryingHold
                    || !Self::correlation_matches(state, correlation_id)
                {
                    return SmallVec::new();
                }
                let now = env.clock.now();
                tracing::warn!(correlation_id = %correlation_id, error = %error, "Hold attempt failed");
                state.stage = BookingStage::Error;
                state.error = Some(BookingError::retryable(
                    BookingErrorCode::NetworkError,
                    error.to_string(),
                ));
                state.touch(now);
                SmallVec::new()
            }

            // ========== Queue-join fallback outcome ==========
            BookingAction::QueueJoinResolved {
                correlation_id,
                outcome,
            } => {
                if state.stage != BookingStage::TryingHold
                    || !Self::correlation_matches(state, correlation_id)
                {
                    return SmallVec::new();
                }
                let now = env.clock.now();

                match outcome {
                    QueueJoinOutcome::Queued { placement } => {
                        tracing::info!(
                            correlation_id = %correlation_id,
                            queue_id = %placement.queue_id,
                            "Admission queue joined after hold rejection"
                        );
                        Self::enter_queue(state, placement, now);
                    }
                    QueueJoinOutcome::Rejected { reason, detail } => {
                        // Give up; surface the original hold rejection when
                        // one was recorded.
                        state.stage = BookingStage::Error;
                        if state.error.is_none() {
                            state.error = Some(BookingError::new(
                                BookingErrorCode::QueueRejected,
                                detail.unwrap_or(reason),
                            ));
                        }
                        state.touch(now);
                    }
                }
                SmallVec::new()
            }

            BookingAction::QueueJoinFailed {
                correlation_id,
                error,
            } => {
                if state.stage != BookingStage::TryingHold
                    || !Self::correlation_matches(state, correlation_id)
                {
                    return SmallVec::new();
                }
                let now = env.clock.now();
                tracing::warn!(correlation_id = %correlation_id, error = %error, "Queue join failed");
                state.stage = BookingStage::Error;
                if state.error.is_none() {
                    state.error = Some(BookingError::retryable(
                        BookingErrorCode::NetworkError,
                        error.to_string(),
                    ));
                }
                state.touch(now);
                SmallVec::new()
            }

            // ========== Queue watch ==========
            BookingAction::QueueStatusReceived { queue_id, status } => {
                if state.stage != BookingStage::InQueue
                    || state.queue_id.as_ref() != Some(&queue_id)
                {
                    // A delayed response for an abandoned queue attempt must
                    // not resurrect stale state.
                    tracing::debug!(queue_id = %queue_id, "Dropping stale queue status");
                    return SmallVec::new();
                }
                let now = env.clock.now();

                match status {
                    QueueStatus::Queued {
                        position,
                        eta_seconds,
                    } => {
                        state.queue_position = Some(position);
                        state.queue_eta_seconds = Some(eta_seconds);
                        state.touch(now);
                        SmallVec::new()
                    }
                    ready @ QueueStatus::Ready { .. } => {
                        if let Some(hold) = ready.inline_hold() {
                            tracing::info!(queue_id = %queue_id, "Admitted with inline hold");
                            return Self::grant_hold(state, hold, now);
                        }
                        if state.claim_in_flight {
                            return SmallVec::new();
                        }
                        let Some(correlation_id) = state.correlation_id else {
                            return SmallVec::new();
                        };
                        tracing::info!(queue_id = %queue_id, "Admitted, claiming hold");
                        state.claim_in_flight = true;
                        state.touch(now);

                        let gateway = Arc::clone(&env.gateway);
                        smallvec![Effect::future(async move {
                            match gateway.claim_hold(&queue_id, correlation_id).await {
                                Ok(outcome) => {
                                    Some(BookingAction::ClaimResolved { queue_id, outcome })
                                }
                                Err(error) => {
                                    Some(BookingAction::ClaimFailed { queue_id, error })
                                }
                            }
                        })]
                    }
                    QueueStatus::Expired => {
                        Self::expire(
                            state,
                            BookingError::new(
                                BookingErrorCode::QueueExpired,
                                "the queue entry timed out",
                            ),
                            now,
                        );
                        SmallVec::new()
                    }
                    QueueStatus::Cancelled => {
                        Self::expire(
                            state,
                            BookingError::new(
                                BookingErrorCode::QueueCancelled,
                                "the queue entry was cancelled",
                            ),
                            now,
                        );
                        SmallVec::new()
                    }
                }
            }

            BookingAction::ClaimResolved { queue_id, outcome } => {
                if state.stage != BookingStage::InQueue
                    || state.queue_id.as_ref() != Some(&queue_id)
                {
                    return SmallVec::new();
                }
                let now = env.clock.now();
                state.claim_in_flight = false;

                match outcome {
                    ClaimOutcome::Granted { hold } => {
                        tracing::info!(queue_id = %queue_id, "Hold claimed");
                        Self::grant_hold(state, hold, now)
                    }
                    ClaimOutcome::Denied { reason } => {
                        // Never silently pretend the hold was granted.
                        tracing::warn!(queue_id = %queue_id, reason = %reason, "Hold claim denied");
                        state.stage = BookingStage::Error;
                        state.clear_queue_fields();
                        state.error =
                            Some(BookingError::new(BookingErrorCode::ClaimFailed, reason));
                        state.touch(now);
                        SmallVec::new()
                    }
                }
            }

            BookingAction::ClaimFailed { queue_id, error } => {
                if state.stage != BookingStage::InQueue
                    || state.queue_id.as_ref() != Some(&queue_id)
                {
                    return SmallVec::new();
                }
                // Transport failure is not terminal for the queue entry; the
                // next ready status triggers another claim.
                let now = env.clock.now();
                tracing::warn!(queue_id = %queue_id, error = %error, "Hold claim did not reach backend");
                state.claim_in_flight = false;
                state.error = Some(BookingError::retryable(
                    BookingErrorCode::NetworkError,
                    error.to_string(),
                ));
                state.touch(now);
                SmallVec::new()
            }

            BookingAction::RealtimeStateChanged { queue_id, active } => {
                if state.stage != BookingStage::InQueue
                    || state.queue_id.as_ref() != Some(&queue_id)
                {
                    return SmallVec::new();
                }
                state.realtime_active = active;
                state.touch(env.clock.now());
                SmallVec::new()
            }

            // ========== Extension ==========
            BookingAction::ExtendHold => {
                let (Some(hold_token), Some(correlation_id)) =
                    (state.hold_token.clone(), state.correlation_id)
                else {
                    tracing::debug!("Extend ignored: no active hold");
                    return SmallVec::new();
                };
                if state.stage != BookingStage::ReadyWithHold {
                    tracing::debug!(stage = %state.stage, "Extend ignored outside holding stage");
                    return SmallVec::new();
                }

                let gateway = Arc::clone(&env.gateway);
                smallvec![Effect::future(async move {
                    match gateway.extend_hold(&hold_token, correlation_id).await {
                        Ok(outcome) => Some(BookingAction::ExtendResolved {
                            correlation_id,
                            outcome,
                        }),
                        Err(error) => Some(BookingAction::ExtendFailed {
                            correlation_id,
                            error,
                        }),
                    }
                })]
            }

            BookingAction::ExtendResolved {
                correlation_id,
                outcome,
            } => {
                // Expiry wins: once the stage left ReadyWithHold a late
                // extension response is dropped.
                if state.stage != BookingStage::ReadyWithHold
                    || !Self::correlation_matches(state, correlation_id)
                {
                    tracing::debug!(correlation_id = %correlation_id, "Dropping late extend response");
                    return SmallVec::new();
                }
                let now = env.clock.now();

                match outcome {
                    ExtendOutcome::Extended { hold_expires_at } => {
                        tracing::info!(
                            correlation_id = %correlation_id,
                            expires_at = %hold_expires_at,
                            "Hold extended"
                        );
                        // The countdown re-checks the deadline when the old
                        // delay fires and reschedules for the remainder.
                        state.hold_expires_at = Some(hold_expires_at);
                        state.error = None;
                        state.touch(now);
                    }
                    ExtendOutcome::Denied { reason } => {
                        tracing::warn!(correlation_id = %correlation_id, reason = %reason, "Extension denied");
                        state.error =
                            Some(BookingError::new(BookingErrorCode::ExtendFailed, reason));
                        state.touch(now);
                    }
                }
                SmallVec::new()
            }

            BookingAction::ExtendFailed {
                correlation_id,
                error,
            } => {
                if state.stage != BookingStage::ReadyWithHold
                    || !Self::correlation_matches(state, correlation_id)
                {
                    return SmallVec::new();
                }
                tracing::warn!(correlation_id = %correlation_id, error = %error, "Extension did not reach backend");
                state.error = Some(BookingError::retryable(
                    BookingErrorCode::ExtendFailed,
                    error.to_string(),
                ));
                state.touch(env.clock.now());
                SmallVec::new()
            }

            // ========== Countdown ==========
            BookingAction::HoldExpired { hold_id } => {
                if state.stage != BookingStage::ReadyWithHold
                    || state.hold_id.as_ref() != Some(&hold_id)
                {
                    return SmallVec::new();
                }
                let now = env.clock.now();
                let Some(expires_at) = state.hold_expires_at else {
                    return SmallVec::new();
                };

                if !expiry::is_expired(expires_at, now) {
                    // A successful extend moved the deadline; re-arm for the
                    // remainder instead of expiring.
                    return smallvec![Self::expiry_effect(hold_id, expires_at, now)];
                }

                tracing::info!(hold_id = %hold_id, "Hold expired");
                metrics::counter!("booking.hold.expired").increment(1);
                Self::expire(
                    state,
                    BookingError::new(BookingErrorCode::HoldExpired, "the hold countdown elapsed"),
                    now,
                );
                SmallVec::new()
            }

            // ========== Checkout ==========
            BookingAction::Checkout {
                payload,
                submission,
            } => {
                let now = env.clock.now();

                if state.stage != BookingStage::ReadyWithHold {
                    return Self::refusal_effect(submission, CheckoutError::HoldNotReady);
                }
                if let Some(expires_at) = state.hold_expires_at {
                    if expiry::is_expired(expires_at, now) {
                        // The countdown has passed even if the timer has not
                        // fired yet; honor expiry before submitting.
                        Self::expire(
                            state,
                            BookingError::new(
                                BookingErrorCode::HoldExpired,
                                "the hold countdown elapsed",
                            ),
                            now,
                        );
                        return Self::refusal_effect(submission, CheckoutError::HoldNotReady);
                    }
                }
                if state.checkout_in_flight {
                    return Self::refusal_effect(submission, CheckoutError::AlreadyInProgress);
                }

                let (Some(event_id), Some(hold_token), Some(correlation_id)) = (
                    state.event_id.clone(),
                    state.hold_token.clone(),
                    state.correlation_id,
                ) else {
                    return Self::refusal_effect(submission, CheckoutError::HoldNotReady);
                };

                state.checkout_in_flight = true;
                state.touch(now);

                tracing::info!(
                    correlation_id = %correlation_id,
                    submission = %submission,
                    "Submitting checkout"
                );
                metrics::counter!("booking.checkout.submitted").increment(1);

                let gateway = Arc::clone(&env.gateway);
                let request = OrderRequest {
                    event_id,
                    hold_token,
                    items: state.selections.clone(),
                    customer_details: payload.customer_details,
                    payment: payload.payment,
                };

                smallvec![Effect::future(async move {
                    let outcome = gateway
                        .create_order(&request, submission, correlation_id)
                        .await
                        .map_err(CheckoutError::from);
                    Some(BookingAction::CheckoutResolved {
                        submission,
                        outcome,
                    })
                })]
            }

            BookingAction::CheckoutRefused { .. } => {
                // Pure feedback for the waiting caller; the snapshot is
                // untouched so the user keeps whatever state they had.
                SmallVec::new()
            }

            BookingAction::CheckoutResolved {
                submission,
                outcome,
            } => {
                if !state.checkout_in_flight {
                    tracing::debug!(submission = %submission, "Dropping stale checkout result");
                    return SmallVec::new();
                }
                let now = env.clock.now();

                match outcome {
                    Ok(receipt) => {
                        tracing::info!(order_id = %receipt.order_id, "Checkout completed");
                        metrics::counter!("booking.checkout.completed").increment(1);
                        *state = BookingSnapshot::idle(now);
                    }
                    Err(error) => {
                        // Never lose the hold on a transient failure; the
                        // user can retry without re-queueing.
                        tracing::warn!(submission = %submission, error = %error, "Checkout failed");
                        metrics::counter!("booking.checkout.failed").increment(1);
                        state.checkout_in_flight = false;
                        if let Some(code) = error.snapshot_code() {
                            let retryable = matches!(
                                error,
                                CheckoutError::Processing
                                    | CheckoutError::RateLimited
                                    | CheckoutError::Network { retryable: true, .. }
                            );
                            state.error = Some(BookingError {
                                code,
                                message: error.to_string(),
                                retryable,
                            });
                        }
                        state.touch(now);
                    }
                }
                SmallVec::new()
            }

            // ========== Leaving ==========
            BookingAction::CancelQueue => {
                if state.stage != BookingStage::InQueue {
                    tracing::debug!(stage = %state.stage, "Cancel ignored outside queue");
                    return SmallVec::new();
                }
                let now = env.clock.now();
                let queue_id = state.queue_id.clone();
                let correlation_id = state.correlation_id;
                *state = BookingSnapshot::idle(now);

                let (Some(queue_id), Some(correlation_id)) = (queue_id, correlation_id) else {
                    return SmallVec::new();
                };

                // Best effort; the local reset stands whatever the backend
                // answers.
                let gateway = Arc::clone(&env.gateway);
                smallvec![Effect::future(async move {
                    let left = gateway.leave_queue(&queue_id, correlation_id).await;
                    tracing::debug!(queue_id = %queue_id, left, "Queue leave attempted");
                    None
                })]
            }

            BookingAction::Reset => {
                let now = env.clock.now();
                let was_queued = state.stage == BookingStage::InQueue;
                let queue_id = state.queue_id.clone();
                let correlation_id = state.correlation_id;
                *state = BookingSnapshot::idle(now);

                if was_queued {
                    if let (Some(queue_id), Some(correlation_id)) = (queue_id, correlation_id) {
                        let gateway = Arc::clone(&env.gateway);
                        return smallvec![Effect::future(async move {
                            let left = gateway.leave_queue(&queue_id, correlation_id).await;
                            tracing::debug!(queue_id = %queue_id, left, "Queue leave attempted");
                            None
                        })];
                    }
                }
                SmallVec::new()
            }

            // ========== Restart ==========
            BookingAction::Resume => {
                if state.stage != BookingStage::ReadyWithHold {
                    return SmallVec::new();
                }
                let now = env.clock.now();
                let (Some(hold_id), Some(expires_at)) =
                    (state.hold_id.clone(), state.hold_expires_at)
                else {
                    return SmallVec::new();
                };

                if expiry::is_expired(expires_at, now) {
                    // The deadline passed while the process was away; fire
                    // the terminal transition synchronously.
                    Self::expire(
                        state,
                        BookingError::new(
                            BookingErrorCode::HoldExpired,
                            "the hold countdown elapsed",
                        ),
                        now,
                    );
                    return SmallVec::new();
                }

                smallvec![Self::expiry_effect(hold_id, expires_at, now)]
            }
        }
    }
}
