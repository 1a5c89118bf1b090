//! # Boxoffice Testing
//!
//! Testing utilities and helpers for the boxoffice booking architecture.
//!
//! This crate provides:
//! - Mock implementations of Environment traits
//! - A fluent Given-When-Then harness for reducers
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```ignore
//! use boxoffice_testing::{ReducerTest, mocks::FixedClock};
//!
//! ReducerTest::new(BookingReducer::new())
//!     .with_env(test_environment())
//!     .given_state(BookingSnapshot::idle(clock.now()))
//!     .when_action(BookingAction::Reset)
//!     .then_state(|state| {
//!         assert_eq!(state.stage, BookingStage::Idle);
//!     })
//!     .run();
//! ```


pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations for testing.
pub mod mocks {
    use boxoffice_core::environment::Clock;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::{Arc, Mutex};

    /// Controllable clock for deterministic tests
    ///
    /// Returns a fixed instant until advanced, making time-dependent
    /// transitions (hold expiry, queue staleness) reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use boxoffice_testing::mocks::FixedClock;
    /// use boxoffice_core::environment::Clock;
    /// use chrono::Duration;
    ///
    /// let clock = FixedClock::default_epoch();
    /// let before = clock.now();
    /// clock.advance(Duration::seconds(90));
    /// assert_eq!(clock.now() - before, Duration::seconds(90));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Create a fixed clock at the default test epoch (2025-01-01 00:00:00 UTC)
        ///
        /// # Panics
        ///
        /// Panics if the hardcoded timestamp fails to parse, which should
        /// never happen in practice.
        #[must_use]
        #[allow(clippy::expect_used)]
        pub fn default_epoch() -> Self {
            Self::new(
                DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                    .expect("hardcoded timestamp should always parse")
                    .with_timezone(&Utc),
            )
        }

        /// Move the clock forward by `delta`
        ///
        /// # Panics
        ///
        /// Panics if the internal mutex is poisoned (a test thread panicked
        /// while holding it).
        #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable in tests
        pub fn advance(&self, delta: Duration) {
            let mut time = self.time.lock().unwrap();
            *time += delta;
        }

        /// Pin the clock to an absolute instant
        ///
        /// # Panics
        ///
        /// Panics if the internal mutex is poisoned.
        #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable in tests
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap() = time;
        }
    }

    impl Clock for FixedClock {
        #[allow(clippy::unwrap_used)] // Mutex poison is unrecoverable in tests
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::default_epoch()
    }
}

pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::environment::Clock;
    use chrono::Duration;

    #[test]
    fn test_fixed_clock_is_stable() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn test_fixed_clock_advances() {
        let clock = test_clock();
        let before = clock.now();
        clock.advance(Duration::minutes(10));
        assert_eq!(clock.now() - before, Duration::minutes(10));
    }
}
