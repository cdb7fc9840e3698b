//! In-process meeting store.
//!
//! A single mutex guards the whole map, which makes every guarded write
//! trivially atomic.

use super::{MeetingStore, WriteOutcome};
use crate::errors::SchedulerError;
use crate::models::{Meeting, MeetingStatus};
use crate::services::conflict::{find_conflicts, ConflictPolicy, ConflictQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{ConferenceId, MeetingId, ProfileId};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Meeting store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryMeetingStore {
    meetings: Mutex<HashMap<MeetingId, Meeting>>,
}

impl InMemoryMeetingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a meeting as-is, bypassing every check.
    pub async fn seed(&self, meeting: Meeting) {
        self.meetings.lock().await.insert(meeting.id, meeting);
    }

    /// Snapshot of every stored meeting.
    pub async fn all(&self) -> Vec<Meeting> {
        self.meetings.lock().await.values().cloned().collect()
    }
}

fn sorted_by_start(mut meetings: Vec<Meeting>) -> Vec<Meeting> {
    meetings.sort_by(|a, b| {
        a.proposed_time
            .cmp(&b.proposed_time)
            .then(a.created_at.cmp(&b.created_at))
    });
    meetings
}

#[async_trait]
impl MeetingStore for InMemoryMeetingStore {
    async fn insert_unless_conflict(
        &self,
        meeting: Meeting,
        policy: ConflictPolicy,
        query: &ConflictQuery,
    ) -> Result<WriteOutcome, SchedulerError> {
        let mut meetings = self.meetings.lock().await;

        if !find_conflicts(policy, query, meetings.values()).is_empty() {
            return Ok(WriteOutcome::Conflict);
        }

        meetings.insert(meeting.id, meeting.clone());
        Ok(WriteOutcome::Applied(meeting))
    }

    async fn accept_unless_conflict(
        &self,
        meeting_id: MeetingId,
        policy: ConflictPolicy,
        query: &ConflictQuery,
        at: DateTime<Utc>,
    ) -> Result<WriteOutcome, SchedulerError> {
        let mut meetings = self.meetings.lock().await;

        let status = match meetings.get(&meeting_id) {
            Some(m) => m.status,
            None => return Ok(WriteOutcome::NotFound),
        };
        if status != MeetingStatus::Pending {
            return Ok(WriteOutcome::StatusMismatch(status));
        }
        if !find_conflicts(policy, query, meetings.values()).is_empty() {
            return Ok(WriteOutcome::Conflict);
        }

        match meetings.get_mut(&meeting_id) {
            Some(meeting) => {
                meeting.status = MeetingStatus::Accepted;
                meeting.updated_at = at;
                Ok(WriteOutcome::Applied(meeting.clone()))
            }
            None => Ok(WriteOutcome::NotFound),
        }
    }

    async fn transition(
        &self,
        meeting_id: MeetingId,
        from: &[MeetingStatus],
        to: MeetingStatus,
        at: DateTime<Utc>,
    ) -> Result<WriteOutcome, SchedulerError> {
        let mut meetings = self.meetings.lock().await;

        let Some(meeting) = meetings.get_mut(&meeting_id) else {
            return Ok(WriteOutcome::NotFound);
        };
        if !from.contains(&meeting.status) {
            return Ok(WriteOutcome::StatusMismatch(meeting.status));
        }

        meeting.status = to;
        meeting.updated_at = at;
        Ok(WriteOutcome::Applied(meeting.clone()))
    }

    async fn get(&self, meeting_id: MeetingId) -> Result<Option<Meeting>, SchedulerError> {
        Ok(self.meetings.lock().await.get(&meeting_id).cloned())
    }

    async fn find_active_near(
        &self,
        conference_id: ConferenceId,
        participants: &[ProfileId],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Meeting>, SchedulerError> {
        let meetings = self.meetings.lock().await;
        let found = meetings
            .values()
            .filter(|m| m.conference_id == conference_id)
            .filter(|m| m.status.is_active())
            .filter(|m| m.involves_any(participants))
            .filter(|m| m.proposed_time <= to && m.window().end >= from)
            .cloned()
            .collect();
        Ok(sorted_by_start(found))
    }

    async fn list_for_profile(
        &self,
        conference_id: ConferenceId,
        profile: ProfileId,
        status: Option<MeetingStatus>,
    ) -> Result<Vec<Meeting>, SchedulerError> {
        let meetings = self.meetings.lock().await;
        let found = meetings
            .values()
            .filter(|m| m.conference_id == conference_id)
            .filter(|m| m.involves(profile))
            .filter(|m| status.is_none_or(|s| m.status == s))
            .cloned()
            .collect();
        Ok(sorted_by_start(found))
    }

    async fn find_due_for_start(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Meeting>, SchedulerError> {
        let meetings = self.meetings.lock().await;
        let found = meetings
            .values()
            .filter(|m| m.status == MeetingStatus::Accepted)
            .filter(|m| m.start_notified_at.is_none())
            .filter(|m| from <= m.proposed_time && m.proposed_time <= to)
            .cloned()
            .collect();
        Ok(sorted_by_start(found))
    }

    async fn claim_start_notification(
        &self,
        meeting_id: MeetingId,
        at: DateTime<Utc>,
    ) -> Result<bool, SchedulerError> {
        let mut meetings = self.meetings.lock().await;
        match meetings.get_mut(&meeting_id) {
            Some(meeting)
                if meeting.status == MeetingStatus::Accepted
                    && meeting.start_notified_at.is_none() =>
            {
                meeting.start_notified_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
