//! Conference and profile builders.

use chrono::{DateTime, TimeZone, Utc};
use common::types::{ConferenceId, ProfileId, UserId};
use scheduler_service::models::{Conference, Profile};

/// UTC instant from calendar parts.
///
/// Panics on an invalid date; fixtures only.
pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid fixture timestamp")
}

/// Conference with a fresh id.
pub fn conference(utc_offset_minutes: i32) -> Conference {
    let id = ConferenceId::new();
    Conference {
        id,
        code: format!("CONF-{}", id.0.simple()),
        name: "Test Conference".to_string(),
        utc_offset_minutes,
    }
}

/// Active profile in `conference`, owned by a fresh user.
pub fn profile(conference: &Conference, display_name: &str) -> Profile {
    Profile {
        id: ProfileId::new(),
        conference_id: conference.id,
        user_id: UserId::new(),
        display_name: display_name.to_string(),
        is_active: true,
    }
}
