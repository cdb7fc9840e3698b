//! Start-time notifier background task.
//!
//! Periodically finds accepted meetings whose start time has arrived and
//! sends both participants a "starting now" notification with a freshly
//! provisioned chat session.
//!
//! # Delivery guarantee
//!
//! At most once per meeting. A meeting is claimed through the store's
//! compare-and-set on `start_notified_at` before anyone is notified, so a
//! restart, an overlapping tick or a second scheduler instance cannot notify
//! twice. The claim also requires the meeting to still be accepted, so a
//! cancellation that lands while the session is being opened wins.
//!
//! Provisioning happens before the claim: if the chat service is down the
//! meeting stays unclaimed and is retried on the next tick while it is still
//! inside the window. Competing instances may both open a session for the
//! same meeting; the chat service dedups on `meeting_id` and returns the
//! existing session, and only the claim winner hands it to participants.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is cancelled, after finishing
//! the tick in progress.

use crate::errors::SchedulerError;
use crate::models::Meeting;
use crate::observability::metrics;
use crate::repositories::MeetingStore;
use crate::services::chat::ChatProvisioner;
use crate::services::notifications::{Notification, NotificationChannel};
use chrono::{DateTime, Utc};
use common::clock::Clock;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default tick interval in seconds.
pub const DEFAULT_TICK_INTERVAL_SECONDS: u64 = 60;

/// Default half-width of the start window in seconds.
pub const DEFAULT_WINDOW_SECONDS: u64 = 60;

/// Upper bound on the start window half-width in seconds.
pub const MAX_WINDOW_SECONDS: u64 = 3600;

/// Configuration for the start notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartNotifierConfig {
    /// Seconds between ticks.
    pub tick_interval_seconds: u64,
    /// A meeting is due when `|proposed_time - now|` is at most this.
    pub window_seconds: u64,
}

impl Default for StartNotifierConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: DEFAULT_TICK_INTERVAL_SECONDS,
            window_seconds: DEFAULT_WINDOW_SECONDS,
        }
    }
}

impl StartNotifierConfig {
    fn window(&self) -> chrono::Duration {
        let seconds = self.window_seconds.min(MAX_WINDOW_SECONDS);
        chrono::Duration::seconds(i64::try_from(seconds).unwrap_or_default())
    }
}

/// What happened to one due meeting during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Claimed and sent; carries the number of participants that could not be reached.
    Notified { delivery_failures: usize },
    /// Another tick or instance claimed it first, or it left `accepted`.
    AlreadyClaimed,
    /// Chat session could not be opened; left unclaimed for retry.
    ProvisionFailed,
    /// Outside the window on re-check.
    Skipped,
    /// Store failure while claiming.
    Error,
}

impl StartOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            StartOutcome::Notified { .. } => "notified",
            StartOutcome::AlreadyClaimed => "already_claimed",
            StartOutcome::ProvisionFailed => "provision_failed",
            StartOutcome::Skipped => "skipped",
            StartOutcome::Error => "error",
        }
    }
}

/// Per-tick counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Meetings returned by the due query.
    pub due: usize,
    /// Meetings claimed and notified.
    pub notified: usize,
    /// Meetings someone else claimed.
    pub already_claimed: usize,
    /// Meetings left for retry after a provisioning failure.
    pub provision_failed: usize,
    /// Meetings dropped by the window re-check.
    pub skipped: usize,
    /// Meetings whose claim hit a store error.
    pub errors: usize,
    /// Individual participant deliveries that failed.
    pub delivery_failures: usize,
}

impl TickSummary {
    fn record(&mut self, outcome: StartOutcome) {
        match outcome {
            StartOutcome::Notified { delivery_failures } => {
                self.notified += 1;
                self.delivery_failures += delivery_failures;
            }
            StartOutcome::AlreadyClaimed => self.already_claimed += 1,
            StartOutcome::ProvisionFailed => self.provision_failed += 1,
            StartOutcome::Skipped => self.skipped += 1,
            StartOutcome::Error => self.errors += 1,
        }
    }
}

/// Detects starting meetings and notifies their participants.
pub struct StartNotifier {
    store: Arc<dyn MeetingStore>,
    notifications: Arc<dyn NotificationChannel>,
    chat: Arc<dyn ChatProvisioner>,
    clock: Arc<dyn Clock>,
    config: StartNotifierConfig,
}

impl StartNotifier {
    /// Wire the notifier to its collaborators.
    pub fn new(
        store: Arc<dyn MeetingStore>,
        notifications: Arc<dyn NotificationChannel>,
        chat: Arc<dyn ChatProvisioner>,
        clock: Arc<dyn Clock>,
        config: StartNotifierConfig,
    ) -> Self {
        Self {
            store,
            notifications,
            chat,
            clock,
            config,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> StartNotifierConfig {
        self.config
    }

    /// Run one tick.
    ///
    /// Due meetings are processed concurrently; a failure on one meeting
    /// never affects another.
    ///
    /// # Errors
    ///
    /// Returns the store error if the due query fails; the tick is abandoned
    /// and the next one retries.
    #[instrument(skip_all, name = "scheduler.task.start_notifier.tick")]
    pub async fn run_tick(&self) -> Result<TickSummary, SchedulerError> {
        let started = Instant::now();
        let now = self.clock.now();
        let window = self.config.window();

        let due = self
            .store
            .find_due_for_start(now - window, now + window)
            .await?;

        let mut summary = TickSummary {
            due: due.len(),
            ..TickSummary::default()
        };

        if !due.is_empty() {
            debug!(
                target: "scheduler.task.start_notifier",
                due_count = due.len(),
                "Found meetings reaching start time"
            );
        }

        let outcomes = join_all(due.into_iter().map(|m| self.process(m, now))).await;
        for outcome in outcomes {
            metrics::record_start_notification(outcome.as_str());
            summary.record(outcome);
        }

        metrics::record_notifier_tick(summary.due, started.elapsed());
        Ok(summary)
    }

    async fn process(&self, meeting: Meeting, now: DateTime<Utc>) -> StartOutcome {
        // Re-verify against the window; the query bounds and `now` may drift.
        let delta = (meeting.proposed_time - now).abs();
        if delta > self.config.window() {
            return StartOutcome::Skipped;
        }

        let session = match self.chat.open_session(&meeting).await {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    target: "scheduler.task.start_notifier",
                    meeting_id = %meeting.id,
                    error = %e,
                    "Chat provisioning failed, will retry next tick"
                );
                return StartOutcome::ProvisionFailed;
            }
        };

        match self.store.claim_start_notification(meeting.id, now).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    target: "scheduler.task.start_notifier",
                    meeting_id = %meeting.id,
                    "Meeting already claimed or no longer accepted"
                );
                return StartOutcome::AlreadyClaimed;
            }
            Err(e) => {
                error!(
                    target: "scheduler.task.start_notifier",
                    meeting_id = %meeting.id,
                    error = %e,
                    "Failed to claim start notification"
                );
                return StartOutcome::Error;
            }
        }

        let notification = Notification::MeetingStarting {
            meeting: meeting.clone(),
            session,
        };

        let mut delivery_failures = 0;
        for participant in meeting.participants() {
            if let Err(e) = self.notifications.deliver(participant, &notification).await {
                delivery_failures += 1;
                metrics::record_notification_failure(notification.kind());
                warn!(
                    target: "scheduler.task.start_notifier",
                    meeting_id = %meeting.id,
                    recipient = %participant,
                    error = %e,
                    "Failed to deliver start notification"
                );
            }
        }

        info!(
            target: "scheduler.task.start_notifier",
            meeting_id = %meeting.id,
            delivery_failures,
            "Start notification sent"
        );
        StartOutcome::Notified { delivery_failures }
    }
}

/// Start the start-notifier background task.
///
/// Ticks every `tick_interval_seconds` (first tick immediately) until
/// `cancel_token` is cancelled.
#[instrument(skip_all, name = "scheduler.task.start_notifier")]
pub async fn start_start_notifier(notifier: Arc<StartNotifier>, cancel_token: CancellationToken) {
    let config = notifier.config();
    info!(
        target: "scheduler.task.start_notifier",
        tick_interval_seconds = config.tick_interval_seconds,
        window_seconds = config.window_seconds,
        "Starting start notifier task"
    );

    let mut interval =
        tokio::time::interval(Duration::from_secs(config.tick_interval_seconds.max(1)));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = notifier.run_tick().await {
                    error!(
                        target: "scheduler.task.start_notifier",
                        error = %e,
                        "Start notifier tick failed"
                    );
                }
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "scheduler.task.start_notifier",
                    "Start notifier received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(
        target: "scheduler.task.start_notifier",
        "Start notifier task stopped"
    );
}
