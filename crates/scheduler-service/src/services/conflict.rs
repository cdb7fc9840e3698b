//! Conflict detection.
//!
//! Decides whether a candidate window would double-book one of the
//! involved participants. The decision itself is a pure function over a
//! set of existing meetings ([`find_conflicts`]); [`ConflictDetector`] wraps
//! it with the store lookup so callers can ask before writing.
//!
//! # Policies
//!
//! - `Padded` (default): an existing active booking conflicts when its start
//!   lies within one candidate duration on either side of the candidate start
//!   (`[start - d, start + d]`, inclusive), or when the two windows overlap.
//!   Back-to-back meetings are therefore rejected.
//! - `Strict`: half-open interval overlap only; back-to-back is allowed.
//!
//! Both policies include exact overlap, so no two active bookings of one
//! participant can ever overlap regardless of which is configured.

use crate::errors::SchedulerError;
use crate::models::{Meeting, TimeWindow};
use crate::observability::metrics;
use crate::repositories::MeetingStore;
use chrono::{DateTime, Utc};
use common::types::{ConferenceId, MeetingId, ProfileId};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};

/// How aggressively neighbouring bookings are treated as conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Padding equal to the candidate's own duration on each side.
    #[default]
    Padded,
    /// Exact half-open overlap.
    Strict,
}

impl ConflictPolicy {
    /// Returns the string representation of the policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Padded => "padded",
            ConflictPolicy::Strict => "strict",
        }
    }

    /// Closed range `[lo, hi]` that an existing meeting's `[start, end]` must
    /// intersect to be worth testing. Stores use it to narrow their query.
    pub fn candidate_range(&self, window: &TimeWindow) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            ConflictPolicy::Padded => {
                let padding = window.duration();
                (window.start - padding, window.start + padding)
            }
            ConflictPolicy::Strict => (window.start, window.end),
        }
    }

    /// Whether `existing` collides with `window` under this policy.
    ///
    /// Ignores status and participants; see [`find_conflicts`].
    pub fn collides(&self, window: &TimeWindow, existing: &Meeting) -> bool {
        let overlap = window.overlaps(&existing.window());
        match self {
            ConflictPolicy::Strict => overlap,
            ConflictPolicy::Padded => {
                let (lo, hi) = self.candidate_range(window);
                overlap || (lo <= existing.proposed_time && existing.proposed_time <= hi)
            }
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "padded" => Ok(ConflictPolicy::Padded),
            "strict" => Ok(ConflictPolicy::Strict),
            other => Err(format!("expected 'padded' or 'strict', got '{}'", other)),
        }
    }
}

/// A conflict question: would `window` double-book any of `participants`?
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictQuery {
    /// Conference whose bookings are considered.
    pub conference_id: ConferenceId,
    /// One or two distinct profiles whose bookings are considered.
    pub participants: Vec<ProfileId>,
    /// Candidate window.
    pub window: TimeWindow,
    /// Meeting to ignore (the one being re-validated on accept).
    pub exclude: Option<MeetingId>,
}

impl ConflictQuery {
    /// Build a query; duplicate participants are collapsed.
    pub fn new(
        conference_id: ConferenceId,
        participants: impl IntoIterator<Item = ProfileId>,
        window: TimeWindow,
    ) -> Self {
        let mut participants: Vec<ProfileId> = participants.into_iter().collect();
        participants.sort();
        participants.dedup();
        Self {
            conference_id,
            participants,
            window,
            exclude: None,
        }
    }

    /// Query for re-validating an existing meeting against everything else.
    pub fn for_meeting(meeting: &Meeting) -> Self {
        Self::new(
            meeting.conference_id,
            meeting.participants(),
            meeting.window(),
        )
        .excluding(meeting.id)
    }

    /// Skip `meeting_id` when scanning.
    pub fn excluding(mut self, meeting_id: MeetingId) -> Self {
        self.exclude = Some(meeting_id);
        self
    }
}

/// Existing meetings that make `query` a conflict under `policy`.
///
/// Only active bookings in the same conference that involve one of the
/// query's participants are considered.
pub fn find_conflicts<'a, I>(policy: ConflictPolicy, query: &ConflictQuery, existing: I) -> Vec<&'a Meeting>
where
    I: IntoIterator<Item = &'a Meeting>,
{
    existing
        .into_iter()
        .filter(|m| m.conference_id == query.conference_id)
        .filter(|m| m.status.is_active())
        .filter(|m| Some(m.id) != query.exclude)
        .filter(|m| m.involves_any(&query.participants))
        .filter(|m| policy.collides(&query.window, m))
        .collect()
}

/// Store-backed conflict detector.
#[derive(Clone)]
pub struct ConflictDetector {
    store: Arc<dyn MeetingStore>,
    policy: ConflictPolicy,
}

impl ConflictDetector {
    /// Create a detector over `store`.
    pub fn new(store: Arc<dyn MeetingStore>, policy: ConflictPolicy) -> Self {
        Self { store, policy }
    }

    /// Configured policy.
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Whether `query` overlaps any existing active booking.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Database` if the store lookup fails.
    #[instrument(skip_all, fields(conference_id = %query.conference_id, policy = %self.policy))]
    pub async fn has_conflict(&self, query: &ConflictQuery) -> Result<bool, SchedulerError> {
        let (lo, hi) = self.policy.candidate_range(&query.window);
        let candidates = self
            .store
            .find_active_near(query.conference_id, &query.participants, lo, hi)
            .await?;

        let conflicts = find_conflicts(self.policy, query, &candidates);
        let conflicted = !conflicts.is_empty();

        if conflicted {
            debug!(
                target: "scheduler.service.conflict",
                conflict_count = conflicts.len(),
                "Candidate window conflicts with existing bookings"
            );
        }
        metrics::record_conflict_check(self.policy.as_str(), conflicted);

        Ok(conflicted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::MeetingStatus;
    use crate::repositories::InMemoryMeetingStore;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, h, m, 0).unwrap()
    }

    fn meeting(
        conference_id: ConferenceId,
        requester: ProfileId,
        recipient: ProfileId,
        start: DateTime<Utc>,
        minutes: u32,
        status: MeetingStatus,
    ) -> Meeting {
        Meeting {
            id: MeetingId::new(),
            conference_id,
            requester_id: requester,
            recipient_id: recipient,
            proposed_time: start,
            duration_minutes: minutes,
            message: None,
            status,
            created_at: at(8, 0),
            updated_at: at(8, 0),
            start_notified_at: None,
        }
    }

    struct Fixture {
        conference: ConferenceId,
        alice: ProfileId,
        bob: ProfileId,
        carol: ProfileId,
    }

    fn fixture() -> Fixture {
        Fixture {
            conference: ConferenceId::new(),
            alice: ProfileId::new(),
            bob: ProfileId::new(),
            carol: ProfileId::new(),
        }
    }

    #[test]
    fn test_same_instant_always_conflicts() {
        let f = fixture();
        let existing = meeting(f.conference, f.alice, f.bob, at(10, 0), 30, MeetingStatus::Accepted);
        let query = ConflictQuery::new(
            f.conference,
            [f.alice, f.carol],
            TimeWindow::starting_at(at(10, 0), 30),
        );

        for policy in [ConflictPolicy::Padded, ConflictPolicy::Strict] {
            assert_eq!(find_conflicts(policy, &query, [&existing]).len(), 1);
        }
    }

    #[test]
    fn test_back_to_back_depends_on_policy() {
        let f = fixture();
        let existing = meeting(f.conference, f.alice, f.bob, at(10, 0), 30, MeetingStatus::Pending);
        let query = ConflictQuery::new(
            f.conference,
            [f.alice, f.carol],
            TimeWindow::starting_at(at(10, 30), 30),
        );

        assert_eq!(
            find_conflicts(ConflictPolicy::Padded, &query, [&existing]).len(),
            1
        );
        assert!(find_conflicts(ConflictPolicy::Strict, &query, [&existing]).is_empty());
    }

    #[test]
    fn test_padded_catches_long_existing_booking() {
        let f = fixture();
        // 2h booking from 09:00; candidate at 10:30 for 30m starts outside the
        // padded start range but overlaps the booking itself.
        let existing = meeting(f.conference, f.alice, f.bob, at(9, 0), 120, MeetingStatus::Accepted);
        let query = ConflictQuery::new(
            f.conference,
            [f.alice, f.carol],
            TimeWindow::starting_at(at(10, 30), 30),
        );

        assert_eq!(
            find_conflicts(ConflictPolicy::Padded, &query, [&existing]).len(),
            1
        );
    }

    #[test]
    fn test_padded_window_edges_are_inclusive() {
        let f = fixture();
        let candidate = TimeWindow::starting_at(at(12, 0), 30);
        let query = ConflictQuery::new(f.conference, [f.alice], candidate);

        let edge_before = meeting(f.conference, f.alice, f.bob, at(11, 30), 30, MeetingStatus::Pending);
        let outside_before = meeting(f.conference, f.alice, f.bob, at(11, 29), 30, MeetingStatus::Pending);
        let edge_after = meeting(f.conference, f.bob, f.alice, at(12, 30), 30, MeetingStatus::Pending);
        let outside_after = meeting(f.conference, f.bob, f.alice, at(12, 31), 30, MeetingStatus::Pending);

        let policy = ConflictPolicy::Padded;
        assert_eq!(find_conflicts(policy, &query, [&edge_before]).len(), 1);
        assert!(find_conflicts(policy, &query, [&outside_before]).is_empty());
        assert_eq!(find_conflicts(policy, &query, [&edge_after]).len(), 1);
        assert!(find_conflicts(policy, &query, [&outside_after]).is_empty());
    }

    #[test]
    fn test_terminal_meetings_do_not_conflict() {
        let f = fixture();
        let query = ConflictQuery::new(
            f.conference,
            [f.alice],
            TimeWindow::starting_at(at(10, 0), 30),
        );

        for status in [
            MeetingStatus::Rejected,
            MeetingStatus::Cancelled,
            MeetingStatus::Completed,
        ] {
            let existing = meeting(f.conference, f.alice, f.bob, at(10, 0), 30, status);
            assert!(find_conflicts(ConflictPolicy::Padded, &query, [&existing]).is_empty());
        }
    }

    #[test]
    fn test_unrelated_participants_and_conferences_ignored() {
        let f = fixture();
        let query = ConflictQuery::new(
            f.conference,
            [f.alice],
            TimeWindow::starting_at(at(10, 0), 30),
        );

        let others = meeting(f.conference, f.bob, f.carol, at(10, 0), 30, MeetingStatus::Accepted);
        let elsewhere = meeting(ConferenceId::new(), f.alice, f.bob, at(10, 0), 30, MeetingStatus::Accepted);

        assert!(find_conflicts(ConflictPolicy::Padded, &query, [&others, &elsewhere]).is_empty());
    }

    #[test]
    fn test_excluded_meeting_is_skipped() {
        let f = fixture();
        let existing = meeting(f.conference, f.alice, f.bob, at(10, 0), 30, MeetingStatus::Pending);
        let query = ConflictQuery::for_meeting(&existing);

        assert_eq!(query.exclude, Some(existing.id));
        assert!(find_conflicts(ConflictPolicy::Padded, &query, [&existing]).is_empty());
    }

    #[test]
    fn test_query_dedups_participants() {
        let f = fixture();
        let query = ConflictQuery::new(
            f.conference,
            [f.alice, f.alice],
            TimeWindow::starting_at(at(10, 0), 30),
        );
        assert_eq!(query.participants, vec![f.alice]);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("padded".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::Padded);
        assert_eq!(" STRICT ".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::Strict);
        assert!("loose".parse::<ConflictPolicy>().is_err());
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::Padded);
    }

    #[tokio::test]
    async fn test_detector_reads_store() {
        let f = fixture();
        let store = Arc::new(InMemoryMeetingStore::new());
        let existing = meeting(f.conference, f.alice, f.bob, at(10, 0), 30, MeetingStatus::Accepted);
        store.seed(existing.clone()).await;

        let detector = ConflictDetector::new(store, ConflictPolicy::Padded);

        let clash = ConflictQuery::new(
            f.conference,
            [f.alice, f.carol],
            TimeWindow::starting_at(at(10, 10), 30),
        );
        assert!(detector.has_conflict(&clash).await.unwrap());

        let free = ConflictQuery::new(
            f.conference,
            [f.alice, f.carol],
            TimeWindow::starting_at(at(15, 0), 30),
        );
        assert!(!detector.has_conflict(&free).await.unwrap());

        let itself = ConflictQuery::for_meeting(&existing);
        assert!(!detector.has_conflict(&itself).await.unwrap());
    }
}
