//! Outbound participant notifications.
//!
//! Delivery is fire-and-forget from the scheduler's point of view: callers
//! log a failed delivery and move on.

use crate::models::Meeting;
use crate::services::chat::ChatSession;
use async_trait::async_trait;
use common::types::{MeetingId, ProfileId};
use thiserror::Error;
use tracing::info;

/// Event delivered to one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A new pending request awaits the recipient.
    MeetingRequested { meeting: Meeting },
    /// A participant withdrew the meeting.
    MeetingCancelled {
        meeting: Meeting,
        cancelled_by: ProfileId,
    },
    /// The meeting's start time has arrived.
    MeetingStarting {
        meeting: Meeting,
        session: ChatSession,
    },
}

impl Notification {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::MeetingRequested { .. } => "meeting_requested",
            Notification::MeetingCancelled { .. } => "meeting_cancelled",
            Notification::MeetingStarting { .. } => "meeting_starting",
        }
    }

    /// Meeting the event is about.
    pub fn meeting_id(&self) -> MeetingId {
        match self {
            Notification::MeetingRequested { meeting }
            | Notification::MeetingCancelled { meeting, .. }
            | Notification::MeetingStarting { meeting, .. } => meeting.id,
        }
    }
}

/// Delivery failure.
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    #[error("Recipient unreachable: {0}")]
    Unreachable(String),

    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// Push-message delivery to a participant.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Deliver `notification` to `recipient`.
    async fn deliver(
        &self,
        recipient: ProfileId,
        notification: &Notification,
    ) -> Result<(), NotifyError>;
}

/// Channel that only writes a log line per delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotificationChannel;

#[async_trait]
impl NotificationChannel for LoggingNotificationChannel {
    async fn deliver(
        &self,
        recipient: ProfileId,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        info!(
            target: "scheduler.notifications",
            recipient = %recipient,
            meeting_id = %notification.meeting_id(),
            kind = notification.kind(),
            "Notification delivered"
        );
        Ok(())
    }
}

/// Mock channel for testing.
pub mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every delivery; can fail deliveries to chosen profiles.
    #[derive(Debug, Default)]
    pub struct RecordingChannel {
        delivered: Mutex<Vec<(ProfileId, Notification)>>,
        failing: Mutex<HashSet<ProfileId>>,
    }

    impl RecordingChannel {
        /// Create a channel that accepts everything.
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail every delivery addressed to `profile`.
        pub fn fail_for(&self, profile: ProfileId) {
            if let Ok(mut failing) = self.failing.lock() {
                failing.insert(profile);
            }
        }

        /// Successful deliveries so far, in order.
        pub fn delivered(&self) -> Vec<(ProfileId, Notification)> {
            self.delivered
                .lock()
                .map(|d| d.clone())
                .unwrap_or_default()
        }

        /// Successful deliveries of `kind` to `recipient`.
        pub fn count_for(&self, recipient: ProfileId, kind: &str) -> usize {
            self.delivered()
                .iter()
                .filter(|(to, n)| *to == recipient && n.kind() == kind)
                .count()
        }

        /// Successful deliveries of `kind` to anyone.
        pub fn count_kind(&self, kind: &str) -> usize {
            self.delivered()
                .iter()
                .filter(|(_, n)| n.kind() == kind)
                .count()
        }
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        async fn deliver(
            &self,
            recipient: ProfileId,
            notification: &Notification,
        ) -> Result<(), NotifyError> {
            let fails = self
                .failing
                .lock()
                .map(|f| f.contains(&recipient))
                .unwrap_or(false);
            if fails {
                return Err(NotifyError::Unreachable(format!(
                    "mock failure for {}",
                    recipient
                )));
            }

            if let Ok(mut delivered) = self.delivered.lock() {
                delivered.push((recipient, notification.clone()));
            }
            Ok(())
        }
    }
}
