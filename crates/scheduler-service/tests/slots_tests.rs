//! Free slot tests through the public service surface.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::NaiveDate;
use scheduler_service::errors::SchedulerError;
use scheduler_service::models::TimeWindow;
use scheduler_test_utils::{at, TestScheduler};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
}

#[tokio::test]
async fn test_accepted_meeting_blocks_only_its_own_slot() {
    let h = TestScheduler::new(at(2026, 6, 1, 8, 0));
    let conf = h.conference(0);
    let (a, b) = (h.attendee(&conf, "A"), h.attendee(&conf, "B"));
    h.book(&a, &b, at(2026, 6, 1, 14, 0), 30).await.unwrap();

    let slots: Vec<_> = h
        .service
        .available_slots(a.user_id, conf.id, day())
        .await
        .unwrap()
        .collect();

    assert!(!slots.contains(&at(2026, 6, 1, 14, 0)));
    assert!(slots.contains(&at(2026, 6, 1, 13, 30)));
    assert!(slots.contains(&at(2026, 6, 1, 14, 30)));
    assert_eq!(slots.len(), 17);

    // The other participant sees the same gap; a bystander does not.
    let b_slots: Vec<_> = h
        .service
        .available_slots(b.user_id, conf.id, day())
        .await
        .unwrap()
        .collect();
    assert!(!b_slots.contains(&at(2026, 6, 1, 14, 0)));

    let c = h.attendee(&conf, "C");
    let c_slots = h
        .service
        .available_slots(c.user_id, conf.id, day())
        .await
        .unwrap();
    assert_eq!(c_slots.count(), 18);
}

#[tokio::test]
async fn test_slots_are_sound_for_every_booking() {
    let h = TestScheduler::new(at(2026, 6, 1, 8, 0));
    let conf = h.conference(0);
    let a = h.attendee(&conf, "A");
    let others: Vec<_> = (0..3)
        .map(|i| h.attendee(&conf, &format!("other-{i}")))
        .collect();

    let mut busy = Vec::new();
    for (other, (hour, minute, length)) in others.iter().zip([(9, 45, 45), (12, 0, 60), (17, 15, 30)]) {
        let start = at(2026, 6, 1, hour, minute);
        h.request(other, &a, start, length).await.unwrap();
        busy.push(TimeWindow::starting_at(start, length));
    }

    let day_start = at(2026, 6, 1, 9, 0);
    let day_end = at(2026, 6, 1, 18, 0);
    let slots: Vec<_> = h
        .service
        .available_slots(a.user_id, conf.id, day())
        .await
        .unwrap()
        .collect();

    assert!(!slots.is_empty());
    assert!(slots.windows(2).all(|pair| pair.first() < pair.last()));
    for slot in &slots {
        let window = TimeWindow::starting_at(*slot, 30);
        assert!(*slot >= day_start && *slot < day_end);
        assert!(busy.iter().all(|b| !b.overlaps(&window)));
    }
}

#[tokio::test]
async fn test_slots_follow_conference_local_day() {
    // UTC+02:00: local 09:00-18:00 is 07:00-16:00 UTC.
    let h = TestScheduler::new(at(2026, 5, 31, 20, 0));
    let conf = h.conference(120);
    let a = h.attendee(&conf, "A");

    let slots: Vec<_> = h
        .service
        .available_slots(a.user_id, conf.id, day())
        .await
        .unwrap()
        .collect();

    assert_eq!(slots.first(), Some(&at(2026, 6, 1, 7, 0)));
    assert_eq!(slots.last(), Some(&at(2026, 6, 1, 15, 30)));
}

#[tokio::test]
async fn test_slots_skip_the_past() {
    let h = TestScheduler::new(at(2026, 6, 1, 15, 10));
    let conf = h.conference(0);
    let a = h.attendee(&conf, "A");

    let slots: Vec<_> = h
        .service
        .available_slots(a.user_id, conf.id, day())
        .await
        .unwrap()
        .collect();

    assert_eq!(slots.first(), Some(&at(2026, 6, 1, 15, 30)));
    assert_eq!(slots.len(), 5);
}

#[tokio::test]
async fn test_slots_are_a_snapshot() {
    let h = TestScheduler::new(at(2026, 6, 1, 8, 0));
    let conf = h.conference(0);
    let (a, b) = (h.attendee(&conf, "A"), h.attendee(&conf, "B"));

    let before = h
        .service
        .available_slots(a.user_id, conf.id, day())
        .await
        .unwrap();
    h.request(&b, &a, at(2026, 6, 1, 10, 0), 30).await.unwrap();

    assert!(before.clone().any(|s| s == at(2026, 6, 1, 10, 0)));
    let after: Vec<_> = h
        .service
        .available_slots(a.user_id, conf.id, day())
        .await
        .unwrap()
        .collect();
    assert!(!after.contains(&at(2026, 6, 1, 10, 0)));
    assert_eq!(before.count(), after.len() + 1);

    // Suggestions reserve nothing.
    h.request(&b, &a, at(2026, 6, 1, 11, 0), 30).await.unwrap();
}

#[tokio::test]
async fn test_slots_require_membership() {
    let h = TestScheduler::new(at(2026, 6, 1, 8, 0));
    let conf = h.conference(0);
    let other = h.conference(0);
    let outsider = h.attendee(&other, "outsider");

    assert!(matches!(
        h.service
            .available_slots(outsider.user_id, conf.id, day())
            .await,
        Err(SchedulerError::NotInConference)
    ));
    assert!(matches!(
        h.service
            .available_slots(outsider.user_id, common::types::ConferenceId::new(), day())
            .await,
        Err(SchedulerError::ConferenceNotFound)
    ));
}
