//! Meeting store.
//!
//! The lifecycle service and the start notifier only see [`MeetingStore`].
//! Two implementations exist: [`PgMeetingStore`] for production and
//! [`InMemoryMeetingStore`] for tests and local runs.
//!
//! # Atomicity
//!
//! Writes that must not race are exposed as single guarded operations:
//!
//! - `insert_unless_conflict` / `accept_unless_conflict` re-run the conflict
//!   check and write under one lock, so two concurrent requests can never both
//!   book an overlapping slot for the same participant.
//! - `transition` is a compare-and-set on the current status.
//! - `claim_start_notification` sets the notified marker only if unset and
//!   the meeting is still accepted.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryMeetingStore;
pub use postgres::PgMeetingStore;

use crate::errors::SchedulerError;
use crate::models::{Meeting, MeetingStatus};
use crate::services::conflict::{ConflictPolicy, ConflictQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{ConferenceId, MeetingId, ProfileId};

/// Result of a guarded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write happened; carries the stored meeting.
    Applied(Meeting),
    /// An overlapping active booking exists; nothing was written.
    Conflict,
    /// The meeting was not in one of the expected statuses.
    StatusMismatch(MeetingStatus),
    /// No meeting with that id.
    NotFound,
}

/// Persistence for meetings.
#[async_trait]
pub trait MeetingStore: Send + Sync {
    /// Insert `meeting` unless `query` conflicts under `policy`.
    ///
    /// Returns `Applied` or `Conflict`.
    async fn insert_unless_conflict(
        &self,
        meeting: Meeting,
        policy: ConflictPolicy,
        query: &ConflictQuery,
    ) -> Result<WriteOutcome, SchedulerError>;

    /// Move a pending meeting to accepted unless `query` conflicts.
    async fn accept_unless_conflict(
        &self,
        meeting_id: MeetingId,
        policy: ConflictPolicy,
        query: &ConflictQuery,
        at: DateTime<Utc>,
    ) -> Result<WriteOutcome, SchedulerError>;

    /// Compare-and-set the status. Applies only if the current status is in `from`.
    async fn transition(
        &self,
        meeting_id: MeetingId,
        from: &[MeetingStatus],
        to: MeetingStatus,
        at: DateTime<Utc>,
    ) -> Result<WriteOutcome, SchedulerError>;

    /// Fetch one meeting.
    async fn get(&self, meeting_id: MeetingId) -> Result<Option<Meeting>, SchedulerError>;

    /// Active meetings in `conference_id` involving any of `participants`
    /// whose closed interval `[start, end]` intersects `[from, to]`.
    async fn find_active_near(
        &self,
        conference_id: ConferenceId,
        participants: &[ProfileId],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Meeting>, SchedulerError>;

    /// Meetings where `profile` is a participant, ascending by start.
    async fn list_for_profile(
        &self,
        conference_id: ConferenceId,
        profile: ProfileId,
        status: Option<MeetingStatus>,
    ) -> Result<Vec<Meeting>, SchedulerError>;

    /// Accepted, not yet start-notified meetings starting within `[from, to]`.
    async fn find_due_for_start(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Meeting>, SchedulerError>;

    /// Set the start-notified marker if unset and the meeting is still
    /// accepted. Returns whether this call set it.
    async fn claim_start_notification(
        &self,
        meeting_id: MeetingId,
        at: DateTime<Utc>,
    ) -> Result<bool, SchedulerError>;
}
