//! Scheduler models.
//!
//! Contains the meeting entity, its lifecycle states and the time window
//! arithmetic shared by the conflict detector and the slot generator.

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use common::types::{ConferenceId, MeetingId, ProfileId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of the optional note a requester attaches to a meeting.
pub const MAX_MESSAGE_LENGTH: usize = 1000;

/// Meeting status enumeration.
///
/// ```text
/// pending -> accepted -> completed
/// pending -> rejected
/// pending | accepted -> cancelled
/// ```
///
/// `rejected`, `cancelled` and `completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    /// Requested, waiting for the recipient.
    Pending,

    /// Confirmed by the recipient.
    Accepted,

    /// Declined by the recipient.
    Rejected,

    /// Withdrawn by either participant.
    Cancelled,

    /// Held and closed by a participant.
    Completed,
}

impl MeetingStatus {
    /// Statuses that hold a participant's time.
    pub const ACTIVE: [MeetingStatus; 2] = [MeetingStatus::Pending, MeetingStatus::Accepted];

    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Pending => "pending",
            MeetingStatus::Accepted => "accepted",
            MeetingStatus::Rejected => "rejected",
            MeetingStatus::Cancelled => "cancelled",
            MeetingStatus::Completed => "completed",
        }
    }

    /// Whether the meeting counts as a booking for conflict checks.
    pub fn is_active(&self) -> bool {
        matches!(self, MeetingStatus::Pending | MeetingStatus::Accepted)
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(&self, next: MeetingStatus) -> bool {
        matches!(
            (self, next),
            (MeetingStatus::Pending, MeetingStatus::Accepted)
                | (MeetingStatus::Pending, MeetingStatus::Rejected)
                | (MeetingStatus::Pending, MeetingStatus::Cancelled)
                | (MeetingStatus::Accepted, MeetingStatus::Cancelled)
                | (MeetingStatus::Accepted, MeetingStatus::Completed)
        )
    }
}

impl fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown meeting status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for MeetingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MeetingStatus::Pending),
            "accepted" => Ok(MeetingStatus::Accepted),
            "rejected" => Ok(MeetingStatus::Rejected),
            "cancelled" => Ok(MeetingStatus::Cancelled),
            "completed" => Ok(MeetingStatus::Completed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window starting at `start` lasting `minutes`.
    pub fn starting_at(start: DateTime<Utc>, minutes: u32) -> Self {
        Self {
            start,
            end: start + Duration::minutes(i64::from(minutes)),
        }
    }

    /// Length of the window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Half-open overlap: touching endpoints do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `at` falls inside the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// A 1:1 meeting between two profiles of the same conference.
///
/// Everything except `status`, `updated_at` and `start_notified_at` is fixed
/// at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    /// Unique meeting identifier.
    pub id: MeetingId,

    /// Conference the meeting belongs to.
    pub conference_id: ConferenceId,

    /// Profile that proposed the meeting.
    pub requester_id: ProfileId,

    /// Profile the meeting was proposed to.
    pub recipient_id: ProfileId,

    /// Start of the meeting (UTC).
    pub proposed_time: DateTime<Utc>,

    /// Length in minutes; always positive.
    pub duration_minutes: u32,

    /// Optional note from requester to recipient.
    pub message: Option<String>,

    /// Current lifecycle state.
    pub status: MeetingStatus,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,

    /// When the "starting now" notification was claimed; `None` until then.
    pub start_notified_at: Option<DateTime<Utc>>,
}

impl Meeting {
    /// The meeting's booked interval.
    pub fn window(&self) -> TimeWindow {
        TimeWindow::starting_at(self.proposed_time, self.duration_minutes)
    }

    /// Whether `profile` is the requester or the recipient.
    pub fn involves(&self, profile: ProfileId) -> bool {
        self.requester_id == profile || self.recipient_id == profile
    }

    /// Whether the meeting touches any of `profiles`.
    pub fn involves_any(&self, profiles: &[ProfileId]) -> bool {
        profiles.iter().any(|p| self.involves(*p))
    }

    /// The other participant, if `profile` is one of the two.
    pub fn counterpart(&self, profile: ProfileId) -> Option<ProfileId> {
        if self.requester_id == profile {
            Some(self.recipient_id)
        } else if self.recipient_id == profile {
            Some(self.requester_id)
        } else {
            None
        }
    }

    /// Both participants, requester first.
    pub fn participants(&self) -> [ProfileId; 2] {
        [self.requester_id, self.recipient_id]
    }
}

/// Conference as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conference {
    /// Conference identifier.
    pub id: ConferenceId,

    /// Human-readable join code.
    pub code: String,

    /// Display name.
    pub name: String,

    /// Offset of the conference's local time from UTC, in minutes.
    pub utc_offset_minutes: i32,
}

impl Conference {
    /// Local time zone of the conference; falls back to UTC on an out of range offset.
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).unwrap_or(Utc.fix())
    }
}

/// A participant's profile inside one conference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile identifier.
    pub id: ProfileId,

    /// Conference the profile belongs to.
    pub conference_id: ConferenceId,

    /// External identity that owns the profile.
    pub user_id: UserId,

    /// Name shown to the other participant.
    pub display_name: String,

    /// Inactive profiles cannot request meetings.
    pub is_active: bool,
}
