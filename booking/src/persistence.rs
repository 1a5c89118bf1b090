//! Snapshot persistence for reload-survivable bookings.
//!
//! The snapshot is stored as one JSON blob under a fixed storage key so a
//! restarted session resumes an in-flight reservation instead of losing
//! it. Storage failures never surface to the booking flow: the adapter
//! degrades to in-memory-only operation and logs the condition.

use crate::types::{BookingSnapshot, BookingStage};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// Fixed storage key for the persisted snapshot
pub const SNAPSHOT_STORAGE_KEY: &str = "boxoffice.booking.snapshot";

/// Errors raised by a concrete snapshot store
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The backing storage could not be read or written
    #[error("Snapshot storage failed: {0}")]
    Io(String),

    /// The stored blob could not be encoded or decoded
    #[error("Snapshot codec failed: {0}")]
    Codec(String),
}

/// A place to keep the one persisted snapshot blob
pub trait SnapshotStore: Send + Sync {
    /// Load the stored snapshot, if any
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the store is unreadable or holds
    /// an undecodable blob.
    fn load(&self) -> Result<Option<BookingSnapshot>, PersistenceError>;

    /// Replace the stored snapshot
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the store is unwritable.
    fn save(&self, snapshot: &BookingSnapshot) -> Result<(), PersistenceError>;

    /// Remove the stored snapshot
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the store is unwritable.
    fn clear(&self) -> Result<(), PersistenceError>;
}

/// Snapshot store backed by one JSON file named after the storage key
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Store the blob inside `dir`, named after the fixed storage key
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join(format!("{SNAPSHOT_STORAGE_KEY}.json")),
        }
    }

    /// Store under the directory named by `BOOKING_SNAPSHOT_PATH`
    /// (default `.boxoffice`)
    #[must_use]
    pub fn from_env() -> Self {
        let dir =
            std::env::var("BOOKING_SNAPSHOT_PATH").unwrap_or_else(|_| ".boxoffice".to_string());
        Self::new(dir)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<BookingSnapshot>, PersistenceError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistenceError::Io(e.to_string())),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| PersistenceError::Codec(e.to_string()))
    }

    fn save(&self, snapshot: &BookingSnapshot) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PersistenceError::Io(e.to_string()))?;
        }
        let blob =
            serde_json::to_string(snapshot).map_err(|e| PersistenceError::Codec(e.to_string()))?;
        std::fs::write(&self.path, blob).map_err(|e| PersistenceError::Io(e.to_string()))
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::Io(e.to_string())),
        }
    }
}

/// Snapshot store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<String>>,
}

impl MemorySnapshotStore {
    /// Create an empty in-memory store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn load(&self) -> Result<Option<BookingSnapshot>, PersistenceError> {
        let slot = self.slot.lock().unwrap();
        slot.as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| PersistenceError::Codec(e.to_string()))
    }

    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn save(&self, snapshot: &BookingSnapshot) -> Result<(), PersistenceError> {
        let blob =
            serde_json::to_string(snapshot).map_err(|e| PersistenceError::Codec(e.to_string()))?;
        *self.slot.lock().unwrap() = Some(blob);
        Ok(())
    }

    #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable
    fn clear(&self) -> Result<(), PersistenceError> {
        *self.slot.lock().unwrap() = None;
        Ok(())
    }
}

/// Persistence front with in-memory degradation
///
/// Writes go to memory first and best-effort to the backing store; a
/// failing backing store (disabled storage, permissions) is logged and the
/// booking flow continues memory-only, exactly as if persistence were
/// never configured.
pub struct SnapshotAdapter {
    backing: Option<Box<dyn SnapshotStore>>,
    memory: MemorySnapshotStore,
}

impl SnapshotAdapter {
    /// Adapter over a concrete backing store
    #[must_use]
    pub fn new(backing: Box<dyn SnapshotStore>) -> Self {
        Self {
            backing: Some(backing),
            memory: MemorySnapshotStore::new(),
        }
    }

    /// Adapter with no backing store; snapshots die with the process
    #[must_use]
    pub fn memory_only() -> Self {
        Self {
            backing: None,
            memory: MemorySnapshotStore::new(),
        }
    }

    /// Persist the snapshot, never failing the caller
    pub fn save(&self, snapshot: &BookingSnapshot) {
        if let Err(error) = self.memory.save(snapshot) {
            tracing::warn!(error = %error, "In-memory snapshot save failed");
        }
        if let Some(backing) = &self.backing {
            if let Err(error) = backing.save(snapshot) {
                tracing::warn!(error = %error, "Snapshot store degraded to memory-only");
            }
        }
    }

    /// Load the last stored snapshot, preferring the backing store
    #[must_use]
    pub fn load(&self) -> Option<BookingSnapshot> {
        if let Some(backing) = &self.backing {
            match backing.load() {
                Ok(Some(snapshot)) => return Some(snapshot),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(error = %error, "Snapshot load failed, trying memory");
                }
            }
        }
        self.memory.load().ok().flatten()
    }

    /// Drop the stored snapshot, never failing the caller
    pub fn clear(&self) {
        if let Err(error) = self.memory.clear() {
            tracing::warn!(error = %error, "In-memory snapshot clear failed");
        }
        if let Some(backing) = &self.backing {
            if let Err(error) = backing.clear() {
                tracing::warn!(error = %error, "Snapshot clear failed");
            }
        }
    }
}

/// Decide whether a stored snapshot is still worth resuming
///
/// A held snapshot survives while its expiry is in the future; a queued
/// snapshot survives while its last mutation is within the staleness
/// bound (queues carry no absolute expiry). Everything else starts over
/// from a fresh idle snapshot.
#[must_use]
pub fn restore_or_idle(
    stored: Option<BookingSnapshot>,
    now: DateTime<Utc>,
    queue_stale_after: chrono::Duration,
) -> BookingSnapshot {
    let Some(snapshot) = stored else {
        return BookingSnapshot::idle(now);
    };

    match snapshot.stage {
        BookingStage::ReadyWithHold => match snapshot.hold_expires_at {
            Some(expires_at) if !crate::expiry::is_expired(expires_at, now) => {
                tracing::info!("Resuming held booking from storage");
                snapshot
            }
            _ => {
                tracing::info!("Discarding stored booking: hold already expired");
                BookingSnapshot::idle(now)
            }
        },
        BookingStage::InQueue => {
            if now - snapshot.last_updated <= queue_stale_after {
                tracing::info!("Resuming queued booking from storage");
                snapshot
            } else {
                tracing::info!("Discarding stored booking: queue entry stale");
                BookingSnapshot::idle(now)
            }
        }
        _ => BookingSnapshot::idle(now),
    }
}
