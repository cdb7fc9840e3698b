//! Start notifier tests.
//!
//! Uses the manual clock for tick-level tests and tokio's test-util time
//! control for the background loop:
//! - Exactly one "starting" notification per participant
//! - At-most-once across restarts and competing instances
//! - Isolation of failing deliveries and chat provisioning retries
//! - Shutdown via CancellationToken

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Duration as ChronoDuration;
use scheduler_service::repositories::MeetingStore;
use scheduler_service::services::chat::mock::ScriptedChatProvisioner;
use scheduler_service::services::notifications::Notification;
use scheduler_service::services::LifecyclePolicy;
use scheduler_service::tasks::{start_start_notifier, StartNotifier, StartNotifierConfig};
use scheduler_test_utils::{at, TestScheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const STARTING: &str = "meeting_starting";

#[tokio::test]
async fn test_tick_at_start_notifies_each_participant_once() {
    let h = TestScheduler::new(at(2026, 6, 1, 12, 0));
    let conf = h.conference(0);
    let (a, b) = (h.attendee(&conf, "A"), h.attendee(&conf, "B"));
    let t = at(2026, 6, 1, 14, 0);
    let meeting = h.book(&a, &b, t, 30).await.unwrap();

    h.set_time(t);
    let summary = h.notifier.run_tick().await.unwrap();
    assert_eq!(summary.notified, 1);

    assert_eq!(h.notifications.count_for(a.id, STARTING), 1);
    assert_eq!(h.notifications.count_for(b.id, STARTING), 1);

    let session_ids: Vec<_> = h
        .notifications
        .delivered()
        .into_iter()
        .filter_map(|(_, n)| match n {
            Notification::MeetingStarting { meeting: m, session } if m.id == meeting.id => {
                Some(session.session_id)
            }
            _ => None,
        })
        .collect();
    assert_eq!(session_ids.len(), 2);
    assert!(session_ids.iter().all(|s| *s == format!("chat-{}", meeting.id)));

    // Ticks later in the window send nothing more.
    h.advance(ChronoDuration::seconds(30));
    h.notifier.run_tick().await.unwrap();
    assert_eq!(h.notifications.count_kind(STARTING), 2);
}

#[tokio::test]
async fn test_any_tick_inside_window_covers_the_meeting() {
    let t = at(2026, 6, 1, 14, 0);
    for offset_seconds in [-60, -1, 0, 1, 60] {
        let h = TestScheduler::new(at(2026, 6, 1, 12, 0));
        let conf = h.conference(0);
        let (a, b) = (h.attendee(&conf, "A"), h.attendee(&conf, "B"));
        h.book(&a, &b, t, 30).await.unwrap();

        h.set_time(t + ChronoDuration::seconds(offset_seconds));
        h.notifier.run_tick().await.unwrap();
        assert_eq!(h.notifications.count_kind(STARTING), 2, "offset {offset_seconds}");
    }
}

#[tokio::test]
async fn test_pending_and_cancelled_meetings_never_start() {
    let h = TestScheduler::new(at(2026, 6, 1, 12, 0));
    let conf = h.conference(0);
    let (a, b, c) = (
        h.attendee(&conf, "A"),
        h.attendee(&conf, "B"),
        h.attendee(&conf, "C"),
    );
    let t = at(2026, 6, 1, 14, 0);
    h.request(&a, &b, t, 30).await.unwrap();
    let doomed = h.book(&c, &h.attendee(&conf, "D"), t, 30).await.unwrap();
    h.service.cancel(doomed.id, c.user_id).await.unwrap();

    h.set_time(t);
    let summary = h.notifier.run_tick().await.unwrap();
    assert_eq!(summary.due, 0);
    assert_eq!(h.notifications.count_kind(STARTING), 0);
}

#[tokio::test]
async fn test_restarted_notifier_does_not_resend() {
    let h = TestScheduler::new(at(2026, 6, 1, 12, 0));
    let conf = h.conference(0);
    let (a, b) = (h.attendee(&conf, "A"), h.attendee(&conf, "B"));
    let t = at(2026, 6, 1, 14, 0);
    h.book(&a, &b, t, 30).await.unwrap();

    h.set_time(t);
    h.notifier.run_tick().await.unwrap();

    // A fresh notifier over the same store stands in for a process restart.
    let restarted = StartNotifier::new(
        h.store.clone(),
        h.notifications.clone(),
        h.chat.clone(),
        h.clock.clone(),
        StartNotifierConfig::default(),
    );
    h.advance(ChronoDuration::seconds(20));
    let summary = restarted.run_tick().await.unwrap();
    assert_eq!(summary.due, 0);
    assert_eq!(h.notifications.count_kind(STARTING), 2);
}

#[tokio::test]
async fn test_competing_notifiers_notify_once() {
    let h = TestScheduler::new(at(2026, 6, 1, 12, 0));
    let conf = h.conference(0);
    let (a, b) = (h.attendee(&conf, "A"), h.attendee(&conf, "B"));
    let t = at(2026, 6, 1, 14, 0);
    let meeting = h.book(&a, &b, t, 30).await.unwrap();
    h.set_time(t);

    let second = Arc::new(StartNotifier::new(
        h.store.clone(),
        h.notifications.clone(),
        h.chat.clone(),
        h.clock.clone(),
        StartNotifierConfig::default(),
    ));

    let (first, other) = tokio::join!(h.notifier.run_tick(), second.run_tick());
    let (first, other) = (first.unwrap(), other.unwrap());

    assert_eq!(first.notified + other.notified, 1);
    assert_eq!(h.notifications.count_for(a.id, STARTING), 1);
    assert_eq!(h.notifications.count_for(b.id, STARTING), 1);

    // Whichever instance won, participants get the meeting's one session.
    let sessions: Vec<String> = h
        .notifications
        .delivered()
        .into_iter()
        .filter_map(|(_, n)| match n {
            Notification::MeetingStarting { session, .. } => Some(session.session_id),
            _ => None,
        })
        .collect();
    assert_eq!(sessions, vec![format!("chat-{}", meeting.id); 2]);

    let stored = h.store.get(meeting.id).await.unwrap().unwrap();
    assert_eq!(stored.start_notified_at, Some(t));
}

#[tokio::test]
async fn test_failing_participant_does_not_block_others() {
    let h = TestScheduler::new(at(2026, 6, 1, 12, 0));
    let conf = h.conference(0);
    let (a, b, c, d) = (
        h.attendee(&conf, "A"),
        h.attendee(&conf, "B"),
        h.attendee(&conf, "C"),
        h.attendee(&conf, "D"),
    );
    let t = at(2026, 6, 1, 14, 0);
    h.book(&a, &b, t, 30).await.unwrap();
    h.book(&c, &d, t, 30).await.unwrap();
    h.notifications.fail_for(a.id);

    h.set_time(t);
    let summary = h.notifier.run_tick().await.unwrap();

    assert_eq!(summary.notified, 2);
    assert_eq!(summary.delivery_failures, 1);
    assert_eq!(h.notifications.count_for(b.id, STARTING), 1);
    assert_eq!(h.notifications.count_for(c.id, STARTING), 1);
    assert_eq!(h.notifications.count_for(d.id, STARTING), 1);
}

#[tokio::test]
async fn test_chat_outage_retries_until_window_closes() {
    let h = TestScheduler::with_options(
        at(2026, 6, 1, 12, 0),
        LifecyclePolicy::default(),
        StartNotifierConfig::default(),
        ScriptedChatProvisioner::failing_first(3),
    );
    let conf = h.conference(0);
    let (a, b) = (h.attendee(&conf, "A"), h.attendee(&conf, "B"));
    let t = at(2026, 6, 1, 14, 0);
    let meeting = h.book(&a, &b, t, 30).await.unwrap();

    h.set_time(t - ChronoDuration::seconds(60));
    assert_eq!(h.notifier.run_tick().await.unwrap().provision_failed, 1);
    h.advance(ChronoDuration::seconds(60));
    assert_eq!(h.notifier.run_tick().await.unwrap().provision_failed, 1);
    h.advance(ChronoDuration::seconds(60));
    assert_eq!(h.notifier.run_tick().await.unwrap().provision_failed, 1);

    // Chat is back, but the window has passed.
    h.advance(ChronoDuration::seconds(60));
    assert_eq!(h.notifier.run_tick().await.unwrap().due, 0);
    assert_eq!(h.notifications.count_kind(STARTING), 0);

    let stored = h.store.get(meeting.id).await.unwrap().unwrap();
    assert!(stored.start_notified_at.is_none());
    assert_eq!(h.chat.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_background_task_ticks_and_stops_on_cancel() {
    let h = TestScheduler::new(at(2026, 6, 1, 12, 0));
    let conf = h.conference(0);
    let (a, b) = (h.attendee(&conf, "A"), h.attendee(&conf, "B"));
    let t = at(2026, 6, 1, 14, 0);
    h.book(&a, &b, t, 30).await.unwrap();

    let cancel_token = CancellationToken::new();
    let handle = tokio::spawn(start_start_notifier(
        Arc::clone(&h.notifier),
        cancel_token.clone(),
    ));

    // First tick is immediate; nothing is due yet.
    settle().await;
    assert_eq!(h.notifications.count_kind(STARTING), 0);

    h.set_time(t);
    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(h.notifications.count_kind(STARTING), 2);

    cancel_token.cancel();
    settle().await;
    assert!(handle.is_finished());

    // No ticks after shutdown.
    let (c, d) = (h.attendee(&conf, "C"), h.attendee(&conf, "D"));
    h.set_time(at(2026, 6, 1, 13, 0));
    h.book(&c, &d, at(2026, 6, 1, 15, 0), 30).await.unwrap();
    h.set_time(at(2026, 6, 1, 15, 0));
    tokio::time::advance(Duration::from_secs(120)).await;
    settle().await;
    assert_eq!(h.notifications.count_kind(STARTING), 2);
}

async fn settle() {
    tokio::time::advance(Duration::from_millis(10)).await;
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}
