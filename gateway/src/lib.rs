//! # Boxoffice Gateway
//!
//! Client for the hold, queue, and order services of the ticketing backend.
//!
//! This crate translates coordinator intents into network operations and
//! absorbs the backend's error surface into a small typed result set:
//!
//! - [`TicketGateway`]: the operation contract (attempt a hold, join and
//!   watch a queue, claim and extend a hold, create an order)
//! - [`HttpTicketGateway`]: production implementation over HTTP + an
//!   optional WebSocket push channel with graceful degradation to polling
//! - Wire payloads modeled as serde tagged unions, validated at this
//!   boundary so nothing downstream touches raw JSON
//!
//! Every call attaches the caller's correlation ID as a request header so
//! external logs are traceable end to end, and runs under a configured
//! timeout. Transport failures are reported as retryable; business
//! rejections are not retryable by default.

/// Configuration loaded from environment variables
pub mod config;

/// Error types for gateway operations
pub mod error;

/// Domain identifiers and wire payload types
pub mod types;

/// The gateway trait and its HTTP implementation
pub mod client;

/// Push-channel subscription for queue status updates
pub mod feed;

/// Adaptive polling cadence for queue status
pub mod cadence;

pub use cadence::poll_interval;
pub use client::{HttpTicketGateway, TicketGateway};
pub use config::{GatewayConfig, PollConfig};
pub use error::GatewayError;
pub use feed::{FeedErrorCallback, QueueFeedHandle, StatusCallback};
pub use types::{
    CategoryId, CheckoutFailure, ClaimOutcome, CorrelationId, EventId, ExtendOutcome, GrantedHold,
    HoldId, HoldOutcome, HoldRequest, HoldToken, IdempotencyKey, OrderId, OrderReceipt,
    OrderRequest, QueueId, QueueJoinOutcome, QueuePlacement, QueueStatus, SelectionInput,
};
