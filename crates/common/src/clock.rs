//! Wall clock abstraction.
//!
//! Time-dependent logic (past-time validation, start-time detection) reads
//! "now" through [`Clock`] so tests can pin and advance time without
//! sleeping.

use chrono::{DateTime, Utc};

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-utils"))]
mod manual {
    use super::Clock;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock that only moves when told to.
    ///
    /// Stored as epoch milliseconds so reads never block.
    #[derive(Debug)]
    pub struct ManualClock {
        millis: AtomicI64,
    }

    impl ManualClock {
        /// Create a clock pinned at `start`.
        #[must_use]
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                millis: AtomicI64::new(start.timestamp_millis()),
            }
        }

        /// Jump to an absolute instant.
        pub fn set(&self, at: DateTime<Utc>) {
            self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
        }

        /// Move forward by `by`.
        pub fn advance(&self, by: Duration) {
            self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_system_clock_is_close_to_now() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
    }

    #[test]
    fn test_manual_clock_set_and_advance() {
        let start = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), start + Duration::minutes(90));

        let later = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }
}
