//! Scheduler error types.
//!
//! Every validation and conflict failure is a named variant so transport
//! layers can map it to a user-facing prompt. `code()` gives a stable
//! identifier and `status_code()` the HTTP-equivalent status for callers
//! that sit behind an HTTP API.

use crate::models::MeetingStatus;
use thiserror::Error;

/// Which quota denied a meeting request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaScope {
    /// Conference-wide meeting limit.
    Conference,
    /// Per-user meeting limit inside a conference.
    User,
}

impl QuotaScope {
    /// Returns the string representation of the scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaScope::Conference => "conference",
            QuotaScope::User => "user",
        }
    }
}

impl std::fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduler error type.
///
/// Maps to HTTP-equivalent status codes:
/// - ConferenceNotFound, RecipientNotFound, MeetingNotFound: 404
/// - NotInConference, NotRecipient, NotParticipant: 403
/// - CannotMeetSelf, InvalidTimeInPast, InvalidDuration, MessageTooLong: 400
/// - TimeConflict, AlreadyProcessed, AlreadyFinalized, MeetingNotAccepted,
///   MeetingNotStarted: 409
/// - QuotaExceeded: 429
/// - Database, Internal: 500
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Conference not found")]
    ConferenceNotFound,

    #[error("Caller has no active profile in this conference")]
    NotInConference,

    #[error("Recipient not found in this conference")]
    RecipientNotFound,

    #[error("Cannot request a meeting with yourself")]
    CannotMeetSelf,

    #[error("Proposed time must be in the future")]
    InvalidTimeInPast,

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Message exceeds {max} characters")]
    MessageTooLong { max: usize },

    #[error("Time conflicts with an existing meeting")]
    TimeConflict,

    #[error("Meeting quota exceeded ({scope}): {current}/{limit}")]
    QuotaExceeded {
        scope: QuotaScope,
        current: u32,
        limit: u32,
    },

    #[error("Meeting not found")]
    MeetingNotFound,

    #[error("Only the recipient can respond to this meeting")]
    NotRecipient,

    #[error("Only a participant can change this meeting")]
    NotParticipant,

    #[error("Meeting already processed (status: {0})")]
    AlreadyProcessed(MeetingStatus),

    #[error("Meeting already finalized (status: {0})")]
    AlreadyFinalized(MeetingStatus),

    #[error("Meeting is not accepted (status: {0})")]
    MeetingNotAccepted(MeetingStatus),

    #[error("Meeting has not started yet")]
    MeetingNotStarted,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error")]
    Internal,
}

impl SchedulerError {
    /// Stable machine-readable identifier.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::ConferenceNotFound => "CONFERENCE_NOT_FOUND",
            SchedulerError::NotInConference => "NOT_IN_CONFERENCE",
            SchedulerError::RecipientNotFound => "RECIPIENT_NOT_FOUND",
            SchedulerError::CannotMeetSelf => "CANNOT_MEET_SELF",
            SchedulerError::InvalidTimeInPast => "INVALID_TIME_IN_PAST",
            SchedulerError::InvalidDuration(_) => "INVALID_DURATION",
            SchedulerError::MessageTooLong { .. } => "MESSAGE_TOO_LONG",
            SchedulerError::TimeConflict => "TIME_CONFLICT",
            SchedulerError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            SchedulerError::MeetingNotFound => "MEETING_NOT_FOUND",
            SchedulerError::NotRecipient => "NOT_RECIPIENT",
            SchedulerError::NotParticipant => "NOT_PARTICIPANT",
            SchedulerError::AlreadyProcessed(_) => "ALREADY_PROCESSED",
            SchedulerError::AlreadyFinalized(_) => "ALREADY_FINALIZED",
            SchedulerError::MeetingNotAccepted(_) => "MEETING_NOT_ACCEPTED",
            SchedulerError::MeetingNotStarted => "MEETING_NOT_STARTED",
            SchedulerError::Database(_) => "DATABASE_ERROR",
            SchedulerError::Internal => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            SchedulerError::ConferenceNotFound
            | SchedulerError::RecipientNotFound
            | SchedulerError::MeetingNotFound => 404,
            SchedulerError::NotInConference
            | SchedulerError::NotRecipient
            | SchedulerError::NotParticipant => 403,
            SchedulerError::CannotMeetSelf
            | SchedulerError::InvalidTimeInPast
            | SchedulerError::InvalidDuration(_)
            | SchedulerError::MessageTooLong { .. } => 400,
            SchedulerError::TimeConflict
            | SchedulerError::AlreadyProcessed(_)
            | SchedulerError::AlreadyFinalized(_)
            | SchedulerError::MeetingNotAccepted(_)
            | SchedulerError::MeetingNotStarted => 409,
            SchedulerError::QuotaExceeded { .. } => 429,
            SchedulerError::Database(_) | SchedulerError::Internal => 500,
        }
    }

    /// Whether the failure came from infrastructure rather than the request.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, SchedulerError::Database(_) | SchedulerError::Internal)
    }
}

/// Convert sqlx errors to SchedulerError
impl From<sqlx::Error> for SchedulerError {
    fn from(err: sqlx::Error) -> Self {
        SchedulerError::Database(err.to_string())
    }
}
