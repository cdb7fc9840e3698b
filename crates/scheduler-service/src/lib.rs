//! Scheduler Service Library
//!
//! Core of the conference 1:1 meeting scheduler:
//!
//! - Meeting lifecycle (request, accept, reject, cancel, complete)
//! - Double-booking prevention for both participants
//! - Free slot suggestions inside a conference's working day
//! - Start-time notifications with chat session provisioning
//!
//! # Architecture
//!
//! Services own the rules; repositories own persistence; collaborators
//! (directory, quota, notifications, chat) sit behind traits:
//!
//! ```text
//! services/lifecycle.rs -> services/conflict.rs -> repositories/*.rs
//! tasks/start_notifier.rs -> services/chat.rs, services/notifications.rs
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error taxonomy with status code mapping
//! - `models` - Meetings, statuses and time windows
//! - `observability` - Metrics
//! - `repositories` - Meeting store implementations
//! - `services` - Lifecycle, conflicts, slots and collaborator seams
//! - `tasks` - Background tasks

pub mod config;
pub mod errors;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod services;
pub mod tasks;
