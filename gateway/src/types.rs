//! Domain identifiers and wire payload types for the ticketing backend.
//!
//! Backend-owned identifiers are opaque strings minted by the inventory
//! service; they are wrapped in newtypes so a queue ID can never be passed
//! where a hold ID is expected. Response payloads are serde tagged unions
//! decoded exactly once, at this boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! backend_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a backend-issued identifier
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// View the identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is empty
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

backend_id! {
    /// Identifier of a sellable live event
    EventId
}

backend_id! {
    /// Identifier of a ticket category within an event
    CategoryId
}

backend_id! {
    /// Identifier of an admission-queue entry
    QueueId
}

backend_id! {
    /// Identifier of a granted hold
    HoldId
}

backend_id! {
    /// Identifier of a created order
    OrderId
}

/// Opaque credential authorizing checkout and extension of a hold
///
/// The token body is a bearer credential; `Debug` redacts it so it never
/// leaks into logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HoldToken(String);

impl HoldToken {
    /// Wrap a backend-issued hold token
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// View the credential for transmission to the backend
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HoldToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HoldToken(***)")
    }
}

/// Unique identifier correlating all network calls of one booking attempt.
///
/// Generated once per attempt and propagated as the `x-correlation-id`
/// header on every subsequent call, so external logs are traceable end to
/// end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new correlation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-submission-attempt identifier letting the backend deduplicate
/// retried checkout requests.
///
/// A fresh key is minted for every checkout invocation; the backend treats
/// a repeated key as the same submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    /// Generate a new idempotency key.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IdempotencyKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// One requested ticket category and quantity
///
/// Immutable once submitted to a hold attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionInput {
    /// Ticket category to reserve from
    pub category_id: CategoryId,
    /// Number of tickets, must be greater than zero
    pub quantity: u32,
}

impl SelectionInput {
    /// Create a selection for `quantity` tickets of `category_id`
    #[must_use]
    pub fn new(category_id: impl Into<CategoryId>, quantity: u32) -> Self {
        Self {
            category_id: category_id.into(),
            quantity,
        }
    }
}

/// Inputs for a hold attempt or an explicit queue join
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldRequest {
    /// Event to reserve tickets for
    pub event_id: EventId,
    /// Requested categories and quantities
    pub selections: Vec<SelectionInput>,
    /// Optional caller-supplied identity hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester_id: Option<String>,
    /// Trace identifier mirrored into the body for backend-side logs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// Inputs for an order-create submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// Event being purchased
    pub event_id: EventId,
    /// Credential for the hold backing this order
    pub hold_token: HoldToken,
    /// Purchased categories and quantities
    pub items: Vec<SelectionInput>,
    /// Customer details as collected by the presentation layer
    pub customer_details: serde_json::Value,
    /// Payment instruction as collected by the presentation layer
    pub payment: serde_json::Value,
}

// ============================================================================
// Responses
// ============================================================================

/// A granted hold: identifier, credential, and absolute expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantedHold {
    /// Hold identifier
    pub hold_id: HoldId,
    /// Credential required for checkout and extension
    pub hold_token: HoldToken,
    /// Absolute expiry timestamp of the hold
    pub hold_expires_at: DateTime<Utc>,
}

/// Placement in the admission queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePlacement {
    /// Queue entry identifier
    pub queue_id: QueueId,
    /// Approximate position, advisory display value only
    #[serde(default)]
    pub position: u32,
    /// Approximate seconds until admission, advisory display value only
    #[serde(default)]
    pub eta_seconds: u32,
}

/// Outcome of a hold attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HoldOutcome {
    /// The hold was granted immediately
    #[serde(rename_all = "camelCase")]
    Acquired {
        /// The granted hold
        #[serde(flatten)]
        hold: GrantedHold,
    },
    /// The system is under load; the requester was queued
    #[serde(rename_all = "camelCase")]
    Queued {
        /// Queue placement
        #[serde(flatten)]
        placement: QueuePlacement,
    },
    /// The backend refused the hold
    #[serde(rename_all = "camelCase")]
    Rejected {
        /// Machine-readable rejection reason
        reason: String,
        /// Human-readable detail, if provided
        #[serde(default)]
        detail: Option<String>,
    },
}

/// Outcome of an explicit queue join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueueJoinOutcome {
    /// The requester was queued
    #[serde(rename_all = "camelCase")]
    Queued {
        /// Queue placement
        #[serde(flatten)]
        placement: QueuePlacement,
    },
    /// The backend refused to queue the requester
    #[serde(rename_all = "camelCase")]
    Rejected {
        /// Machine-readable rejection reason
        reason: String,
        /// Human-readable detail, if provided
        #[serde(default)]
        detail: Option<String>,
    },
}

/// A queue-status update, identical in shape between the polling endpoint
/// and the push channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueueStatus {
    /// Still waiting; position and ETA may have changed
    #[serde(rename_all = "camelCase")]
    Queued {
        /// Approximate position, advisory only
        #[serde(default)]
        position: u32,
        /// Approximate seconds until admission, advisory only
        #[serde(default)]
        eta_seconds: u32,
    },
    /// Admission granted; a hold credential may be embedded
    ///
    /// The credential arrives as flat optional fields; it counts as
    /// inlined only when all three are present (see
    /// [`QueueStatus::inline_hold`]). When absent the client must claim
    /// explicitly.
    #[serde(rename_all = "camelCase")]
    Ready {
        /// Hold identifier, when the backend inlines the credential
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hold_id: Option<HoldId>,
        /// Hold token, when the backend inlines the credential
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hold_token: Option<HoldToken>,
        /// Hold expiry, when the backend inlines the credential
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hold_expires_at: Option<DateTime<Utc>>,
    },
    /// The queue entry timed out
    Expired,
    /// The queue entry was cancelled
    Cancelled,
}

impl QueueStatus {
    /// A `ready` update without an inline credential
    #[must_use]
    pub const fn ready() -> Self {
        Self::Ready {
            hold_id: None,
            hold_token: None,
            hold_expires_at: None,
        }
    }

    /// A `ready` update carrying an inline credential
    #[must_use]
    pub fn ready_with(hold: GrantedHold) -> Self {
        Self::Ready {
            hold_id: Some(hold.hold_id),
            hold_token: Some(hold.hold_token),
            hold_expires_at: Some(hold.hold_expires_at),
        }
    }

    /// The inline credential on a `ready` update, when complete
    ///
    /// A `ready` frame missing any credential field is treated as
    /// credential-less; the caller must claim explicitly.
    #[must_use]
    pub fn inline_hold(&self) -> Option<GrantedHold> {
        match self {
            Self::Ready {
                hold_id: Some(hold_id),
                hold_token: Some(hold_token),
                hold_expires_at: Some(hold_expires_at),
            } => Some(GrantedHold {
                hold_id: hold_id.clone(),
                hold_token: hold_token.clone(),
                hold_expires_at: *hold_expires_at,
            }),
            _ => None,
        }
    }
}

/// Outcome of an explicit hold claim after queue admission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ClaimOutcome {
    /// The hold was granted
    #[serde(rename_all = "camelCase")]
    Granted {
        /// The granted hold
        #[serde(flatten)]
        hold: GrantedHold,
    },
    /// The claim was refused
    #[serde(rename_all = "camelCase")]
    Denied {
        /// Machine-readable refusal reason
        reason: String,
    },
}

/// Outcome of a hold extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExtendOutcome {
    /// The hold deadline moved forward
    #[serde(rename_all = "camelCase")]
    Extended {
        /// New absolute expiry timestamp
        hold_expires_at: DateTime<Utc>,
    },
    /// The extension was refused; the previous deadline stands
    #[serde(rename_all = "camelCase")]
    Denied {
        /// Machine-readable refusal reason
        reason: String,
    },
}

/// Successful order creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    /// Identifier of the created order
    pub order_id: OrderId,
    /// Optional redirect link for completing payment externally
    #[serde(default)]
    pub payment_redirect_url: Option<String>,
}

/// Why an order-create submission did not produce a receipt
///
/// `Processing` and `RateLimited` are recoverable by caller-driven retry
/// after a pause; `Rejected` is a definitive business answer surfaced
/// verbatim; `Network` carries the transport classification.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CheckoutFailure {
    /// The backend is already processing a submission with this key (409)
    #[error("Checkout already processing")]
    Processing,

    /// The backend asked the caller to slow down (429)
    #[error("Checkout rate limited")]
    RateLimited,

    /// The backend refused the order
    #[error("Checkout rejected (status {status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Error payload, surfaced verbatim
        message: String,
    },

    /// The submission may not have reached the backend
    #[error("Checkout transport failure: {0}")]
    Network(#[from] crate::error::GatewayError),
}

impl CheckoutFailure {
    /// Whether the caller may retry the submission after a pause
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Processing | Self::RateLimited => true,
            Self::Rejected { .. } => false,
            Self::Network(error) => error.is_retryable(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hold_outcome_acquired_decodes_flat_fields() {
        let json = r#"{
            "status": "acquired",
            "holdId": "hold-1",
            "holdToken": "tok-abc",
            "holdExpiresAt": "2025-01-01T00:10:00Z"
        }"#;
        let outcome: HoldOutcome = serde_json::from_str(json).unwrap();
        match outcome {
            HoldOutcome::Acquired { hold } => {
                assert_eq!(hold.hold_id.as_str(), "hold-1");
                assert_eq!(hold.hold_token.expose(), "tok-abc");
            }
            other => panic!("expected acquired, got {other:?}"),
        }
    }

    #[test]
    fn hold_outcome_queued_decodes_placement() {
        let json = r#"{"status": "queued", "queueId": "q-9", "position": 10, "etaSeconds": 60}"#;
        let outcome: HoldOutcome = serde_json::from_str(json).unwrap();
        match outcome {
            HoldOutcome::Queued { placement } => {
                assert_eq!(placement.queue_id.as_str(), "q-9");
                assert_eq!(placement.position, 10);
                assert_eq!(placement.eta_seconds, 60);
            }
            other => panic!("expected queued, got {other:?}"),
        }
    }

    #[test]
    fn queue_status_ready_without_credential_decodes_to_none() {
        let json = r#"{"status": "ready"}"#;
        let status: QueueStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status, QueueStatus::ready());
        assert!(status.inline_hold().is_none());
    }

    #[test]
    fn queue_status_ready_with_credential_decodes_inline_hold() {
        let json = r#"{
            "status": "ready",
            "holdId": "hold-2",
            "holdToken": "tok-xyz",
            "holdExpiresAt": "2025-01-01T00:05:00Z"
        }"#;
        let status: QueueStatus = serde_json::from_str(json).unwrap();
        let hold = status.inline_hold().unwrap();
        assert_eq!(hold.hold_id.as_str(), "hold-2");
        assert_eq!(hold.hold_token.expose(), "tok-xyz");
    }

    #[test]
    fn queue_status_ready_with_partial_credential_is_credential_less() {
        // A frame missing the token must not pretend a hold was granted
        let json = r#"{"status": "ready", "holdId": "hold-2"}"#;
        let status: QueueStatus = serde_json::from_str(json).unwrap();
        assert!(status.inline_hold().is_none());
    }

    #[test]
    fn queue_status_terminal_variants_decode() {
        assert_eq!(
            serde_json::from_str::<QueueStatus>(r#"{"status": "expired"}"#).unwrap(),
            QueueStatus::Expired
        );
        assert_eq!(
            serde_json::from_str::<QueueStatus>(r#"{"status": "cancelled"}"#).unwrap(),
            QueueStatus::Cancelled
        );
    }

    #[test]
    fn hold_token_debug_is_redacted() {
        let token = HoldToken::new("super-secret");
        assert_eq!(format!("{token:?}"), "HoldToken(***)");
    }

    #[test]
    fn hold_request_serializes_camel_case() {
        let request = HoldRequest {
            event_id: EventId::from("evt-1"),
            selections: vec![SelectionInput {
                category_id: CategoryId::from("cat-a"),
                quantity: 2,
            }],
            requester_id: None,
            trace_id: Some("trace".to_string()),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["eventId"], "evt-1");
        assert_eq!(json["selections"][0]["categoryId"], "cat-a");
        assert_eq!(json["traceId"], "trace");
        assert!(json.get("requesterId").is_none());
    }

    #[test]
    fn checkout_failure_recoverability() {
        assert!(CheckoutFailure::Processing.is_recoverable());
        assert!(CheckoutFailure::RateLimited.is_recoverable());
        assert!(
            !CheckoutFailure::Rejected {
                status: 422,
                message: "sold out".into()
            }
            .is_recoverable()
        );
    }
}
