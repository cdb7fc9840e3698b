//! # Scheduler Test Utilities
//!
//! Shared test utilities for the scheduler service.
//!
//! This crate provides:
//! - Fixtures for conferences and attendee profiles (`fixtures`)
//! - A harness wiring the lifecycle service and start notifier to in-memory
//!   collaborators and a manual clock (`TestScheduler`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scheduler_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestScheduler::new(at(2026, 6, 1, 8, 0));
//!     let conf = harness.conference(0);
//!     let alice = harness.attendee(&conf, "alice");
//!     let bob = harness.attendee(&conf, "bob");
//!
//!     let meeting = harness
//!         .request(&alice, &bob, at(2026, 6, 1, 14, 0), 30)
//!         .await
//!         .unwrap();
//!     assert!(meeting.status.is_active());
//! }
//! ```

pub mod fixtures;
pub mod harness;

// Re-export commonly used items
pub use fixtures::*;
pub use harness::*;
