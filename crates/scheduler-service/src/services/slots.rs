//! Free-slot generation.
//!
//! Suggests start times inside a conference's local working day that do not
//! overlap any of a participant's active bookings. Suggestions reserve
//! nothing; a later `request` can still fail with `TimeConflict`.

use crate::models::TimeWindow;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

/// Default first slot hour (local).
pub const DEFAULT_DAY_START_HOUR: u32 = 9;

/// Default end hour (local, exclusive).
pub const DEFAULT_DAY_END_HOUR: u32 = 18;

/// Default distance between candidate starts.
pub const DEFAULT_GRANULARITY_MINUTES: u32 = 30;

/// Daily availability window and step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPolicy {
    /// First candidate hour, local time.
    pub day_start_hour: u32,
    /// Hour candidates must start before, local time. May be 24.
    pub day_end_hour: u32,
    /// Slot length and step, in minutes.
    pub granularity_minutes: u32,
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self {
            day_start_hour: DEFAULT_DAY_START_HOUR,
            day_end_hour: DEFAULT_DAY_END_HOUR,
            granularity_minutes: DEFAULT_GRANULARITY_MINUTES,
        }
    }
}

impl SlotPolicy {
    /// The `[start_hour, end_hour)` span of `date` in the zone `offset`, as UTC.
    pub fn day_window(&self, offset: FixedOffset, date: NaiveDate) -> TimeWindow {
        let midnight = date.and_time(NaiveTime::MIN);
        // A fixed offset maps every local time to exactly one instant.
        let local_midnight = offset
            .from_local_datetime(&midnight)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight));

        TimeWindow {
            start: local_midnight + Duration::hours(i64::from(self.day_start_hour)),
            end: local_midnight + Duration::hours(i64::from(self.day_end_hour)),
        }
    }

    /// Lazy sequence of free slot starts.
    ///
    /// `busy` are the participant's active booking windows; only half-open
    /// overlap excludes a slot. Candidates at or before `now` are skipped.
    pub fn free_slots(
        &self,
        offset: FixedOffset,
        date: NaiveDate,
        now: DateTime<Utc>,
        busy: Vec<TimeWindow>,
    ) -> FreeSlots {
        let day = self.day_window(offset, date);
        FreeSlots {
            next: day.start,
            day_end: day.end,
            step: self.granularity_minutes.max(1),
            not_after: now,
            busy,
        }
    }
}

/// Iterator over free slot starts, ascending.
///
/// Owns its inputs, so it can be cloned to restart from the same snapshot.
#[derive(Debug, Clone)]
pub struct FreeSlots {
    next: DateTime<Utc>,
    day_end: DateTime<Utc>,
    step: u32,
    not_after: DateTime<Utc>,
    busy: Vec<TimeWindow>,
}

impl Iterator for FreeSlots {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.day_end {
            let candidate = TimeWindow::starting_at(self.next, self.step);
            self.next = candidate.end;

            if candidate.start <= self.not_after {
                continue;
            }
            if self.busy.iter().any(|b| b.overlaps(&candidate)) {
                continue;
            }
            return Some(candidate.start);
        }
        None
    }
}
