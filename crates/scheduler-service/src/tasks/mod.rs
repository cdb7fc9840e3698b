//! Background tasks for the scheduler.
//!
//! # Tasks
//!
//! - `start_notifier` - Notifies participants when accepted meetings start

pub mod start_notifier;

pub use start_notifier::{start_start_notifier, StartNotifier, StartNotifierConfig, TickSummary};
