//! Meeting lifecycle service.
//!
//! Orchestrates request, accept, reject, cancel and complete. Every
//! operation validates against the current stored state, then performs a
//! single guarded store write; side effects (notifications) run only after
//! the write succeeded and never fail the operation.
//!
//! # Flow for `request`
//!
//! 1. Resolve the conference and the requester's active profile
//! 2. Validate recipient, time, duration and message
//! 3. Consult conference and per-user quotas
//! 4. Conflict pre-check for both participants
//! 5. Guarded insert (re-checks conflicts atomically)
//! 6. Notify the recipient

use crate::errors::{QuotaScope, SchedulerError};
use crate::models::{Meeting, MeetingStatus, Profile, TimeWindow, MAX_MESSAGE_LENGTH};
use crate::observability::metrics;
use crate::repositories::{MeetingStore, WriteOutcome};
use crate::services::conflict::{ConflictDetector, ConflictPolicy, ConflictQuery};
use crate::services::directory::ParticipantDirectory;
use crate::services::notifications::{Notification, NotificationChannel};
use crate::services::quota::QuotaChecker;
use crate::services::slots::{FreeSlots, SlotPolicy};
use chrono::{DateTime, NaiveDate, Utc};
use common::clock::Clock;
use common::types::{ConferenceId, MeetingId, ProfileId, UserId};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Default upper bound on a meeting's length.
pub const DEFAULT_MAX_MEETING_DURATION_MINUTES: u32 = 240;

/// Tunables for the lifecycle service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// How neighbouring bookings are treated.
    pub conflict_policy: ConflictPolicy,
    /// Longest meeting accepted by `request`.
    pub max_duration_minutes: u32,
    /// Availability window for `available_slots`.
    pub slot_policy: SlotPolicy,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::default(),
            max_duration_minutes: DEFAULT_MAX_MEETING_DURATION_MINUTES,
            slot_policy: SlotPolicy::default(),
        }
    }
}

/// Input to [`MeetingService::request`].
#[derive(Debug, Clone)]
pub struct MeetingRequest {
    /// Conference to book in.
    pub conference_id: ConferenceId,
    /// Caller identity; resolved to the requester profile.
    pub requester: UserId,
    /// Profile being asked.
    pub recipient_id: ProfileId,
    /// Proposed start (UTC).
    pub proposed_time: DateTime<Utc>,
    /// Length in minutes.
    pub duration_minutes: u32,
    /// Optional note to the recipient.
    pub message: Option<String>,
}

/// The meeting lifecycle service.
#[derive(Clone)]
pub struct MeetingService {
    store: Arc<dyn MeetingStore>,
    directory: Arc<dyn ParticipantDirectory>,
    quota: Arc<dyn QuotaChecker>,
    notifications: Arc<dyn NotificationChannel>,
    clock: Arc<dyn Clock>,
    conflicts: ConflictDetector,
    policy: LifecyclePolicy,
}

impl MeetingService {
    /// Wire the service to its collaborators.
    pub fn new(
        store: Arc<dyn MeetingStore>,
        directory: Arc<dyn ParticipantDirectory>,
        quota: Arc<dyn QuotaChecker>,
        notifications: Arc<dyn NotificationChannel>,
        clock: Arc<dyn Clock>,
        policy: LifecyclePolicy,
    ) -> Self {
        let conflicts = ConflictDetector::new(Arc::clone(&store), policy.conflict_policy);
        Self {
            store,
            directory,
            quota,
            notifications,
            clock,
            conflicts,
            policy,
        }
    }

    /// Active policy.
    pub fn policy(&self) -> LifecyclePolicy {
        self.policy
    }

    /// Propose a meeting. Returns the stored `pending` meeting.
    ///
    /// # Errors
    ///
    /// `ConferenceNotFound`, `NotInConference`, `CannotMeetSelf`,
    /// `RecipientNotFound`, `InvalidTimeInPast`, `InvalidDuration`,
    /// `MessageTooLong`, `QuotaExceeded`, `TimeConflict`, or `Database`.
    #[instrument(skip_all, fields(conference_id = %req.conference_id, recipient_id = %req.recipient_id))]
    pub async fn request(&self, req: MeetingRequest) -> Result<Meeting, SchedulerError> {
        let start = Instant::now();
        let result = self.request_inner(req).await;
        observe("request", start, &result);
        result
    }

    async fn request_inner(&self, req: MeetingRequest) -> Result<Meeting, SchedulerError> {
        self.directory
            .find_conference(req.conference_id)
            .await?
            .ok_or(SchedulerError::ConferenceNotFound)?;

        let requester = self
            .active_profile(req.conference_id, req.requester)
            .await?;

        if requester.id == req.recipient_id {
            return Err(SchedulerError::CannotMeetSelf);
        }

        let recipient = self
            .directory
            .find_profile(req.recipient_id)
            .await?
            .filter(|p| p.conference_id == req.conference_id)
            .ok_or(SchedulerError::RecipientNotFound)?;

        let now = self.clock.now();
        if req.proposed_time <= now {
            return Err(SchedulerError::InvalidTimeInPast);
        }

        self.validate_duration(req.duration_minutes)?;
        let message = normalize_message(req.message)?;

        self.quota
            .can_create_meeting(req.conference_id)
            .await?
            .enforce(QuotaScope::Conference)
            .inspect_err(|e| warn!(target: "scheduler.service.lifecycle", error = %e, "Meeting request denied by quota"))?;
        self.quota
            .can_user_create_meeting(req.conference_id, req.requester)
            .await?
            .enforce(QuotaScope::User)
            .inspect_err(|e| warn!(target: "scheduler.service.lifecycle", error = %e, "Meeting request denied by quota"))?;

        let window = TimeWindow::starting_at(req.proposed_time, req.duration_minutes);
        let query = ConflictQuery::new(req.conference_id, [requester.id, recipient.id], window);

        if self.conflicts.has_conflict(&query).await? {
            warn!(
                target: "scheduler.service.lifecycle",
                requester_id = %requester.id,
                recipient_id = %recipient.id,
                proposed_time = %req.proposed_time,
                "Meeting request conflicts with an existing booking"
            );
            return Err(SchedulerError::TimeConflict);
        }

        let meeting = Meeting {
            id: MeetingId::new(),
            conference_id: req.conference_id,
            requester_id: requester.id,
            recipient_id: recipient.id,
            proposed_time: req.proposed_time,
            duration_minutes: req.duration_minutes,
            message,
            status: MeetingStatus::Pending,
            created_at: now,
            updated_at: now,
            start_notified_at: None,
        };

        let meeting = match self
            .store
            .insert_unless_conflict(meeting, self.policy.conflict_policy, &query)
            .await?
        {
            WriteOutcome::Applied(meeting) => meeting,
            WriteOutcome::Conflict => {
                warn!(
                    target: "scheduler.service.lifecycle",
                    requester_id = %requester.id,
                    recipient_id = %recipient.id,
                    "Conflicting booking won the race"
                );
                return Err(SchedulerError::TimeConflict);
            }
            WriteOutcome::StatusMismatch(_) | WriteOutcome::NotFound => {
                return Err(SchedulerError::Internal);
            }
        };

        info!(
            target: "scheduler.service.lifecycle",
            meeting_id = %meeting.id,
            requester_id = %meeting.requester_id,
            recipient_id = %meeting.recipient_id,
            proposed_time = %meeting.proposed_time,
            "Meeting requested"
        );

        self.notify(
            meeting.recipient_id,
            Notification::MeetingRequested {
                meeting: meeting.clone(),
            },
        )
        .await;

        Ok(meeting)
    }

    /// Recipient accepts a pending meeting.
    ///
    /// # Errors
    ///
    /// `MeetingNotFound`, `NotRecipient`, `AlreadyProcessed`, `TimeConflict`,
    /// or `Database`.
    #[instrument(skip_all, fields(meeting_id = %meeting_id))]
    pub async fn accept(
        &self,
        meeting_id: MeetingId,
        actor: UserId,
    ) -> Result<Meeting, SchedulerError> {
        let start = Instant::now();
        let result = self.accept_inner(meeting_id, actor).await;
        observe("accept", start, &result);
        result
    }

    async fn accept_inner(
        &self,
        meeting_id: MeetingId,
        actor: UserId,
    ) -> Result<Meeting, SchedulerError> {
        let meeting = self.load(meeting_id).await?;
        self.require_recipient(&meeting, actor).await?;

        if meeting.status != MeetingStatus::Pending {
            return Err(SchedulerError::AlreadyProcessed(meeting.status));
        }

        let query = ConflictQuery::for_meeting(&meeting);
        if self.conflicts.has_conflict(&query).await? {
            warn!(
                target: "scheduler.service.lifecycle",
                meeting_id = %meeting.id,
                "Accept refused: participant booked elsewhere"
            );
            return Err(SchedulerError::TimeConflict);
        }

        let now = self.clock.now();
        let accepted = match self
            .store
            .accept_unless_conflict(meeting.id, self.policy.conflict_policy, &query, now)
            .await?
        {
            WriteOutcome::Applied(m) => m,
            WriteOutcome::Conflict => return Err(SchedulerError::TimeConflict),
            WriteOutcome::StatusMismatch(status) => {
                return Err(SchedulerError::AlreadyProcessed(status))
            }
            WriteOutcome::NotFound => return Err(SchedulerError::MeetingNotFound),
        };

        info!(
            target: "scheduler.service.lifecycle",
            meeting_id = %accepted.id,
            "Meeting accepted"
        );
        Ok(accepted)
    }

    /// Recipient declines a pending meeting.
    ///
    /// # Errors
    ///
    /// `MeetingNotFound`, `NotRecipient`, `AlreadyProcessed`, or `Database`.
    #[instrument(skip_all, fields(meeting_id = %meeting_id))]
    pub async fn reject(
        &self,
        meeting_id: MeetingId,
        actor: UserId,
    ) -> Result<Meeting, SchedulerError> {
        let start = Instant::now();
        let result = self.reject_inner(meeting_id, actor).await;
        observe("reject", start, &result);
        result
    }

    async fn reject_inner(
        &self,
        meeting_id: MeetingId,
        actor: UserId,
    ) -> Result<Meeting, SchedulerError> {
        let meeting = self.load(meeting_id).await?;
        self.require_recipient(&meeting, actor).await?;

        if meeting.status != MeetingStatus::Pending {
            return Err(SchedulerError::AlreadyProcessed(meeting.status));
        }

        let rejected = match self
            .store
            .transition(
                meeting.id,
                &[MeetingStatus::Pending],
                MeetingStatus::Rejected,
                self.clock.now(),
            )
            .await?
        {
            WriteOutcome::Applied(m) => m,
            WriteOutcome::StatusMismatch(status) => {
                return Err(SchedulerError::AlreadyProcessed(status))
            }
            WriteOutcome::NotFound => return Err(SchedulerError::MeetingNotFound),
            WriteOutcome::Conflict => return Err(SchedulerError::Internal),
        };

        info!(
            target: "scheduler.service.lifecycle",
            meeting_id = %rejected.id,
            "Meeting rejected"
        );
        Ok(rejected)
    }

    /// Either participant withdraws a pending or accepted meeting.
    ///
    /// Both participants are notified.
    ///
    /// # Errors
    ///
    /// `MeetingNotFound`, `NotParticipant`, `AlreadyFinalized`, or `Database`.
    #[instrument(skip_all, fields(meeting_id = %meeting_id))]
    pub async fn cancel(
        &self,
        meeting_id: MeetingId,
        actor: UserId,
    ) -> Result<Meeting, SchedulerError> {
        let start = Instant::now();
        let result = self.cancel_inner(meeting_id, actor).await;
        observe("cancel", start, &result);
        result
    }

    async fn cancel_inner(
        &self,
        meeting_id: MeetingId,
        actor: UserId,
    ) -> Result<Meeting, SchedulerError> {
        let meeting = self.load(meeting_id).await?;
        let actor_profile = self.require_participant(&meeting, actor).await?;

        if meeting.status.is_terminal() {
            return Err(SchedulerError::AlreadyFinalized(meeting.status));
        }

        let cancelled = match self
            .store
            .transition(
                meeting.id,
                &MeetingStatus::ACTIVE,
                MeetingStatus::Cancelled,
                self.clock.now(),
            )
            .await?
        {
            WriteOutcome::Applied(m) => m,
            WriteOutcome::StatusMismatch(status) => {
                return Err(SchedulerError::AlreadyFinalized(status))
            }
            WriteOutcome::NotFound => return Err(SchedulerError::MeetingNotFound),
            WriteOutcome::Conflict => return Err(SchedulerError::Internal),
        };

        info!(
            target: "scheduler.service.lifecycle",
            meeting_id = %cancelled.id,
            cancelled_by = %actor_profile,
            "Meeting cancelled"
        );

        let notification = Notification::MeetingCancelled {
            meeting: cancelled.clone(),
            cancelled_by: actor_profile,
        };
        for participant in cancelled.participants() {
            self.notify(participant, notification.clone()).await;
        }

        Ok(cancelled)
    }

    /// A participant closes an accepted meeting that has started.
    ///
    /// # Errors
    ///
    /// `MeetingNotFound` (also when `conference_id` does not match),
    /// `NotParticipant`, `MeetingNotAccepted`, `MeetingNotStarted`, or
    /// `Database`.
    #[instrument(skip_all, fields(meeting_id = %meeting_id, conference_id = %conference_id))]
    pub async fn complete(
        &self,
        meeting_id: MeetingId,
        actor: UserId,
        conference_id: ConferenceId,
    ) -> Result<Meeting, SchedulerError> {
        let start = Instant::now();
        let result = self.complete_inner(meeting_id, actor, conference_id).await;
        observe("complete", start, &result);
        result
    }

    async fn complete_inner(
        &self,
        meeting_id: MeetingId,
        actor: UserId,
        conference_id: ConferenceId,
    ) -> Result<Meeting, SchedulerError> {
        let meeting = self.load(meeting_id).await?;
        if meeting.conference_id != conference_id {
            return Err(SchedulerError::MeetingNotFound);
        }
        self.require_participant(&meeting, actor).await?;

        if meeting.status != MeetingStatus::Accepted {
            return Err(SchedulerError::MeetingNotAccepted(meeting.status));
        }

        let now = self.clock.now();
        if now < meeting.proposed_time {
            return Err(SchedulerError::MeetingNotStarted);
        }

        let completed = match self
            .store
            .transition(
                meeting.id,
                &[MeetingStatus::Accepted],
                MeetingStatus::Completed,
                now,
            )
            .await?
        {
            WriteOutcome::Applied(m) => m,
            WriteOutcome::StatusMismatch(status) => {
                return Err(SchedulerError::MeetingNotAccepted(status))
            }
            WriteOutcome::NotFound => return Err(SchedulerError::MeetingNotFound),
            WriteOutcome::Conflict => return Err(SchedulerError::Internal),
        };

        info!(
            target: "scheduler.service.lifecycle",
            meeting_id = %completed.id,
            "Meeting completed"
        );
        Ok(completed)
    }

    /// Meetings the caller takes part in, ascending by start.
    ///
    /// # Errors
    ///
    /// `ConferenceNotFound`, `NotInConference`, or `Database`.
    #[instrument(skip_all, fields(conference_id = %conference_id))]
    pub async fn list_meetings(
        &self,
        user: UserId,
        conference_id: ConferenceId,
        status: Option<MeetingStatus>,
    ) -> Result<Vec<Meeting>, SchedulerError> {
        let profile = self.conference_profile(conference_id, user).await?;
        self.store
            .list_for_profile(conference_id, profile.id, status)
            .await
    }

    /// Free slot starts for the caller on `date` (conference local day).
    ///
    /// The returned iterator is a snapshot; call again for fresh results.
    ///
    /// # Errors
    ///
    /// `ConferenceNotFound`, `NotInConference`, or `Database`.
    #[instrument(skip_all, fields(conference_id = %conference_id, date = %date))]
    pub async fn available_slots(
        &self,
        user: UserId,
        conference_id: ConferenceId,
        date: NaiveDate,
    ) -> Result<FreeSlots, SchedulerError> {
        let conference = self
            .directory
            .find_conference(conference_id)
            .await?
            .ok_or(SchedulerError::ConferenceNotFound)?;
        let profile = self
            .directory
            .find_profile_by_user(conference_id, user)
            .await?
            .filter(|p| p.is_active)
            .ok_or(SchedulerError::NotInConference)?;

        let slot_policy = self.policy.slot_policy;
        let offset = conference.local_offset();
        let day = slot_policy.day_window(offset, date);

        let busy = self
            .store
            .find_active_near(conference_id, &[profile.id], day.start, day.end)
            .await?
            .iter()
            .map(Meeting::window)
            .collect();

        Ok(slot_policy.free_slots(offset, date, self.clock.now(), busy))
    }

    async fn load(&self, meeting_id: MeetingId) -> Result<Meeting, SchedulerError> {
        self.store
            .get(meeting_id)
            .await?
            .ok_or(SchedulerError::MeetingNotFound)
    }

    async fn active_profile(
        &self,
        conference_id: ConferenceId,
        user: UserId,
    ) -> Result<Profile, SchedulerError> {
        self.directory
            .find_profile_by_user(conference_id, user)
            .await?
            .filter(|p| p.is_active)
            .ok_or(SchedulerError::NotInConference)
    }

    async fn conference_profile(
        &self,
        conference_id: ConferenceId,
        user: UserId,
    ) -> Result<Profile, SchedulerError> {
        self.directory
            .find_conference(conference_id)
            .await?
            .ok_or(SchedulerError::ConferenceNotFound)?;
        self.active_profile(conference_id, user).await
    }

    /// The actor's profile in the meeting's conference, if any.
    async fn actor_profile(
        &self,
        meeting: &Meeting,
        actor: UserId,
    ) -> Result<Option<ProfileId>, SchedulerError> {
        Ok(self
            .directory
            .find_profile_by_user(meeting.conference_id, actor)
            .await?
            .map(|p| p.id))
    }

    async fn require_recipient(
        &self,
        meeting: &Meeting,
        actor: UserId,
    ) -> Result<ProfileId, SchedulerError> {
        match self.actor_profile(meeting, actor).await? {
            Some(profile) if profile == meeting.recipient_id => Ok(profile),
            _ => Err(SchedulerError::NotRecipient),
        }
    }

    async fn require_participant(
        &self,
        meeting: &Meeting,
        actor: UserId,
    ) -> Result<ProfileId, SchedulerError> {
        match self.actor_profile(meeting, actor).await? {
            Some(profile) if meeting.involves(profile) => Ok(profile),
            _ => Err(SchedulerError::NotParticipant),
        }
    }

    fn validate_duration(&self, minutes: u32) -> Result<(), SchedulerError> {
        let max = self.policy.max_duration_minutes;
        if minutes == 0 || minutes > max {
            return Err(SchedulerError::InvalidDuration(format!(
                "must be between 1 and {} minutes",
                max
            )));
        }
        Ok(())
    }

    async fn notify(&self, recipient: ProfileId, notification: Notification) {
        if let Err(e) = self.notifications.deliver(recipient, &notification).await {
            metrics::record_notification_failure(notification.kind());
            warn!(
                target: "scheduler.service.lifecycle",
                meeting_id = %notification.meeting_id(),
                recipient = %recipient,
                kind = notification.kind(),
                error = %e,
                "Notification delivery failed"
            );
        }
    }
}

/// Trim the note; empty becomes `None`.
fn normalize_message(message: Option<String>) -> Result<Option<String>, SchedulerError> {
    let Some(raw) = message else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(SchedulerError::MessageTooLong {
            max: MAX_MESSAGE_LENGTH,
        });
    }
    Ok(Some(trimmed.to_string()))
}

fn observe<T>(operation: &str, start: Instant, result: &Result<T, SchedulerError>) {
    let error_code = result.as_ref().err().map(SchedulerError::code);
    if let Err(e) = result {
        if e.is_infrastructure() {
            tracing::error!(
                target: "scheduler.service.lifecycle",
                operation = operation,
                error = %e,
                "Lifecycle operation failed"
            );
        }
    }
    metrics::record_lifecycle_operation(operation, error_code, start.elapsed());
}
