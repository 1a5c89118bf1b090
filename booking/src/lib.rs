//! # Boxoffice Booking
//!
//! The booking reservation coordinator: the client-resident state machine
//! that turns a ticket selection into a confirmed, paid order under
//! contention.
//!
//! ## What lives here
//!
//! - [`types::BookingSnapshot`]: the single serializable source of truth
//! - [`reducer::BookingReducer`]: every transition of the state machine -
//!   hold acquisition with queue fallback, queue watching with stale-update
//!   filtering, the hold countdown, extension, exactly-once checkout
//! - [`persistence`]: the snapshot store that lets a restarted session
//!   resume an in-flight reservation, with expiry-based invalidation
//! - [`coordinator::BookingCoordinator`]: the facade owning the store, the
//!   queue watch (poll + optional push), and persistence
//!
//! ## Flow
//!
//! ```ignore
//! let coordinator = BookingCoordinator::new(gateway, clock, persistence, config).await;
//!
//! coordinator.start("evt-1".into(), vec![SelectionInput::new("cat-a", 2)], None).await;
//! // ... snapshot moves through trying-hold / in-queue / ready-with-hold
//!
//! let receipt = coordinator.checkout(payload).await?;
//! ```

/// State types: snapshot, stages, error codes
pub mod types;

/// Actions: caller commands and effect results
pub mod actions;

/// Coordinator configuration
pub mod config;

/// The booking state machine reducer
pub mod reducer;

/// Hold-expiry helpers
pub mod expiry;

/// Snapshot persistence with in-memory degradation
pub mod persistence;

/// The coordinator facade
pub mod coordinator;

pub use actions::{BookingAction, CheckoutError, CheckoutPayload};
pub use config::BookingConfig;
pub use coordinator::BookingCoordinator;
pub use persistence::{
    FileSnapshotStore, MemorySnapshotStore, SnapshotAdapter, SnapshotStore, restore_or_idle,
};
pub use reducer::{BookingEnvironment, BookingReducer};
pub use types::{BookingError, BookingErrorCode, BookingSnapshot, BookingStage};

// The backend-owned identifiers and wire unions come from the gateway
// contract; re-exported so UI code depends on one crate.
pub use boxoffice_gateway::types::{
    CategoryId, CorrelationId, EventId, GrantedHold, HoldId, HoldToken, OrderId, OrderReceipt,
    QueueId, SelectionInput,
};
