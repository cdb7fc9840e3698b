//! In-memory scheduler harness.
//!
//! Wires [`MeetingService`] and [`StartNotifier`] to the in-memory store,
//! directory and quota mocks, a recording notification channel, a scripted
//! chat provisioner and a manual clock. Every collaborator is exposed so
//! tests can inspect or reconfigure it.

use crate::fixtures;
use chrono::{DateTime, Duration, Utc};
use common::clock::ManualClock;
use scheduler_service::errors::SchedulerError;
use scheduler_service::models::{Conference, Meeting, Profile};
use scheduler_service::repositories::InMemoryMeetingStore;
use scheduler_service::services::chat::mock::ScriptedChatProvisioner;
use scheduler_service::services::directory::mock::InMemoryDirectory;
use scheduler_service::services::notifications::mock::RecordingChannel;
use scheduler_service::services::quota::mock::MockQuotaChecker;
use scheduler_service::services::{LifecyclePolicy, MeetingRequest, MeetingService};
use scheduler_service::tasks::{StartNotifier, StartNotifierConfig};
use std::sync::Arc;

/// Scheduler wired to in-memory collaborators.
pub struct TestScheduler {
    pub store: Arc<InMemoryMeetingStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub quota: Arc<MockQuotaChecker>,
    pub notifications: Arc<RecordingChannel>,
    pub chat: Arc<ScriptedChatProvisioner>,
    pub clock: Arc<ManualClock>,
    pub service: MeetingService,
    pub notifier: Arc<StartNotifier>,
}

impl TestScheduler {
    /// Harness with default policies and a chat service that always succeeds.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_options(
            now,
            LifecyclePolicy::default(),
            StartNotifierConfig::default(),
            ScriptedChatProvisioner::succeeding(),
        )
    }

    /// Harness with explicit policies and chat behaviour.
    pub fn with_options(
        now: DateTime<Utc>,
        policy: LifecyclePolicy,
        notifier_config: StartNotifierConfig,
        chat: ScriptedChatProvisioner,
    ) -> Self {
        let store = Arc::new(InMemoryMeetingStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let quota = Arc::new(MockQuotaChecker::unlimited());
        let notifications = Arc::new(RecordingChannel::new());
        let chat = Arc::new(chat);
        let clock = Arc::new(ManualClock::new(now));

        let service = MeetingService::new(
            store.clone(),
            directory.clone(),
            quota.clone(),
            notifications.clone(),
            clock.clone(),
            policy,
        );
        let notifier = Arc::new(StartNotifier::new(
            store.clone(),
            notifications.clone(),
            chat.clone(),
            clock.clone(),
            notifier_config,
        ));

        Self {
            store,
            directory,
            quota,
            notifications,
            chat,
            clock,
            service,
            notifier,
        }
    }

    /// Register a conference at `utc_offset_minutes`.
    pub fn conference(&self, utc_offset_minutes: i32) -> Conference {
        let conference = fixtures::conference(utc_offset_minutes);
        self.directory.add_conference(conference.clone());
        conference
    }

    /// Register an active attendee profile in `conference`.
    pub fn attendee(&self, conference: &Conference, display_name: &str) -> Profile {
        let profile = fixtures::profile(conference, display_name);
        self.directory.add_profile(profile.clone());
        profile
    }

    /// `from` asks `to` for a meeting.
    pub async fn request(
        &self,
        from: &Profile,
        to: &Profile,
        proposed_time: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<Meeting, SchedulerError> {
        self.service
            .request(MeetingRequest {
                conference_id: from.conference_id,
                requester: from.user_id,
                recipient_id: to.id,
                proposed_time,
                duration_minutes,
                message: None,
            })
            .await
    }

    /// `from` asks `to`, and `to` accepts.
    pub async fn book(
        &self,
        from: &Profile,
        to: &Profile,
        proposed_time: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<Meeting, SchedulerError> {
        let pending = self
            .request(from, to, proposed_time, duration_minutes)
            .await?;
        self.service.accept(pending.id, to.user_id).await
    }

    /// Current harness time.
    pub fn now(&self) -> DateTime<Utc> {
        common::clock::Clock::now(self.clock.as_ref())
    }

    /// Move the manual clock.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Jump the manual clock.
    pub fn set_time(&self, to: DateTime<Utc>) {
        self.clock.set(to);
    }
}
